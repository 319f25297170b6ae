//! The variable-length "remaining length" field of the fixed header.
//!
//! Each byte carries 7 bits of the value, least significant group first. The
//! high bit is set when another byte follows. At most 4 bytes are allowed.
use crate::{DecodeError, ValidationError};
use bytes::{BufMut, Bytes, BytesMut};

/// The largest value that fits in 4 bytes.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

const MULTIPLIERS: [usize; 4] = [0x01, 0x80, 0x4000, 0x20_0000];

pub fn put_var(dst: &mut impl BufMut, mut value: usize) -> Result<(), ValidationError> {
	if value > MAX_REMAINING_LENGTH {
		return Err(ValidationError::PacketTooLarge(value));
	}

	loop {
		let mut encoded = value % 0x80;
		value /= 0x80;
		if value > 0 {
			encoded |= 0x80;
		}
		dst.put_u8(encoded as u8);
		if value == 0 {
			break Ok(());
		}
	}
}

/// Encodes `value` into 1 to 4 bytes.
pub fn encode_length(value: usize) -> Result<Bytes, ValidationError> {
	let mut dst = BytesMut::with_capacity(4);
	put_var(&mut dst, value)?;
	Ok(dst.freeze())
}

/// Decodes a remaining length from the start of `src`, returning the value
/// and the number of bytes it occupied.
pub fn decode_length(src: &[u8]) -> Result<(usize, usize), DecodeError> {
	let mut value = 0;
	for (index, multiplier) in MULTIPLIERS.into_iter().enumerate() {
		let Some(&encoded) = src.get(index) else {
			return Err(DecodeError::Incomplete);
		};

		value += (encoded & 0x7f) as usize * multiplier;

		// exit early if we've reached the last byte.
		if encoded & 0x80 == 0 {
			return Ok((value, index + 1));
		}
	}

	Err(DecodeError::MalformedLength)
}

/// Number of bytes `value` occupies once encoded.
#[inline]
pub fn length_len(value: usize) -> usize {
	match value {
		0..=0x7f => 1,
		0x80..=0x3fff => 2,
		0x4000..=0x1f_ffff => 3,
		_ => 4,
	}
}
