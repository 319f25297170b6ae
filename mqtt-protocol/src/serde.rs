use crate::ValidationError;
use bytes::BufMut;

#[inline]
pub fn put_u8(dst: &mut impl BufMut, val: u8) {
	dst.put_u8(val);
}

#[inline]
pub fn put_u16(dst: &mut impl BufMut, val: u16) {
	dst.put_u16(val);
}

/// Writes `slice` prefixed with its length as a big-endian `u16`.
pub fn put_prefixed(dst: &mut impl BufMut, slice: &[u8]) -> Result<(), ValidationError> {
	let len = prefixed_len(slice)?;
	put_u16(dst, len);
	dst.put_slice(slice);
	Ok(())
}

#[inline]
pub fn put_str(dst: &mut impl BufMut, s: &str) -> Result<(), ValidationError> {
	put_prefixed(dst, s.as_bytes())
}

#[inline]
pub fn prefixed_len(slice: &[u8]) -> Result<u16, ValidationError> {
	u16::try_from(slice.len()).map_err(|_| ValidationError::StringTooLong(slice.len()))
}
