use crate::{varint, DecodeError};
use bytes::{Buf, Bytes};
use std::str::from_utf8;

type Result<T> = std::result::Result<T, DecodeError>;

/// Reads big-endian fields from a [`Bytes`] buffer without copying.
///
/// Every `take_*` method fails with [`DecodeError::Incomplete`] instead of
/// reading past the end of the buffer.
#[derive(Debug)]
pub struct BytesReader {
	bytes: Bytes,
}

impl BytesReader {
	pub fn new(bytes: Bytes) -> Self {
		Self { bytes }
	}

	pub fn require(&self, len: usize) -> Result<()> {
		if self.bytes.remaining() >= len {
			Ok(())
		} else {
			Err(DecodeError::Incomplete)
		}
	}

	#[inline]
	pub fn remaining(&self) -> usize {
		self.bytes.remaining()
	}

	pub fn take_inner(self) -> Bytes {
		self.bytes
	}

	pub fn take_u8(&mut self) -> Result<u8> {
		self.require(1)?;
		Ok(self.bytes.get_u8())
	}

	pub fn take_u16(&mut self) -> Result<u16> {
		self.require(2)?;
		Ok(self.bytes.get_u16())
	}

	pub fn take_var(&mut self) -> Result<usize> {
		let (value, len) = varint::decode_length(&self.bytes)?;
		self.bytes.advance(len);
		Ok(value)
	}

	pub fn take_bytes(&mut self, len: usize) -> Result<Bytes> {
		self.require(len)?;
		Ok(self.bytes.split_to(len))
	}

	pub fn take_str_bytes(&mut self) -> Result<Bytes> {
		let len = self.take_u16()?;
		let bytes = self.take_bytes(len.into())?;
		Ok(bytes)
	}

	pub fn take_str(&mut self) -> Result<String> {
		let bytes = self.take_str_bytes()?;
		let s = from_utf8(&bytes)?;
		Ok(s.to_owned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn require() {
		let reader = BytesReader::new(Bytes::from_static(&[0x00]));
		assert_eq!(reader.require(1), Ok(()));
		assert_eq!(reader.require(2), Err(DecodeError::Incomplete));
	}

	#[test]
	fn short_string_does_not_over_read() {
		let mut reader = BytesReader::new(Bytes::from_static(&[0x00, 0x05, b'a', b'b']));
		assert_eq!(reader.take_str(), Err(DecodeError::Incomplete));
	}

	#[test]
	fn takes_fields_in_order() {
		let mut reader = BytesReader::new(Bytes::from_static(&[
			0x00, 0x03, b'a', b'/', b'b', 0x12, 0x34, 0x80, 0x01, 0xff,
		]));
		assert_eq!(reader.take_str().unwrap(), "a/b");
		assert_eq!(reader.take_u16().unwrap(), 0x1234);
		assert_eq!(reader.take_var().unwrap(), 128);
		assert_eq!(&reader.take_inner()[..], &[0xff]);
	}
}
