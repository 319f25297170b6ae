use std::str::Utf8Error;
use thiserror::Error;

/// Raised while building a packet, before any bytes reach a transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("client identifier must not be empty")]
	EmptyClientId,
	#[error("client identifier is {0} bytes, at most 65535 are allowed")]
	ClientIdTooLong(usize),
	#[error("client identifier is not valid UTF-8: {0}")]
	ClientIdEncoding(Utf8Error),
	#[error("username is {0} bytes, at most 65535 are allowed")]
	UsernameTooLong(usize),
	#[error("password is {0} bytes, at most 65535 are allowed")]
	PasswordTooLong(usize),
	#[error("invalid will: {0}")]
	InvalidWill(&'static str),
	#[error("invalid topic: {0}")]
	InvalidTopic(&'static str),
	#[error("string of {0} bytes does not fit a length prefix")]
	StringTooLong(usize),
	#[error("subscribe requires at least one topic filter")]
	EmptySubscription,
	#[error("{topics} topic filters but {qos} QoS levels")]
	MismatchedQoS { topics: usize, qos: usize },
	#[error("remaining length {0} exceeds 268435455")]
	PacketTooLarge(usize),
}

/// Raised while decoding inbound bytes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
	/// The buffer ends before the fixed header or the declared remaining length.
	#[error("incomplete packet")]
	Incomplete,
	#[error("remaining length is longer than 4 bytes")]
	MalformedLength,
	#[error("malformed packet: {0}")]
	MalformedPacket(&'static str),
	#[error("invalid fixed header {0:#04x}")]
	InvalidHeader(u8),
	#[error("invalid QoS bits in fixed header {0:#04x}")]
	InvalidQoS(u8),
	#[error("invalid UTF-8: {0}")]
	Utf8(#[from] Utf8Error),
}

impl DecodeError {
	/// Whether more bytes could turn this failure into a successful decode.
	#[inline]
	pub fn is_incomplete(&self) -> bool {
		matches!(self, Self::Incomplete)
	}
}
