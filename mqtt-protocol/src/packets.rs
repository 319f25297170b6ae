use crate::{
	misc::{Credentials, Will},
	serde,
	varint::{self, MAX_REMAINING_LENGTH},
	PacketId, ProtocolVersion, QoS, ValidationError,
};
use bytes::{BufMut, Bytes, BytesMut};

type Result<T> = std::result::Result<T, ValidationError>;

/// Longest string MQTT can carry behind its 2-byte length prefix.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

pub trait SerializePacket {
	/// Validates the packet and serializes it into `dst`.
	///
	/// Nothing is written to `dst` when validation fails.
	fn serialize_into(&self, dst: &mut BytesMut) -> Result<()>;

	/// Serializes the packet into a new buffer.
	fn to_bytes(&self) -> Result<Bytes> {
		let mut dst = BytesMut::new();
		self.serialize_into(&mut dst)?;
		Ok(dst.freeze())
	}
}

//
// Packet Types
//

/// A `Connect` packet is sent by the Client to the Server to initialise a
/// session.
#[derive(Clone, Debug)]
pub struct Connect<'a> {
	/// Selects the protocol name and level.
	pub protocol: ProtocolVersion,

	/// Client ID. Must be between 1 and 65535 bytes.
	pub client_id: &'a str,

	/// Keep-alive timeout in seconds.
	pub keep_alive: u16,

	/// Request a clean session.
	pub clean_session: bool,

	/// Last will and testament for the Client.
	pub will: Option<&'a Will>,

	/// Login credentials.
	pub credentials: Option<&'a Credentials>,
}

/// A Publish packet sent by the Client.
///
/// `id` is only written to the wire when `qos` is above
/// [`AtMostOnce`](QoS::AtMostOnce).
#[derive(Clone, Debug)]
pub struct Publish<'a> {
	pub topic: &'a str,
	pub id: PacketId,
	pub qos: QoS,
	pub retain: bool,
	pub duplicate: bool,
	pub payload: &'a [u8],
}

#[derive(Clone, Debug)]
pub struct Subscribe<'a> {
	pub id: PacketId,
	pub filters: Vec<(&'a str, QoS)>,
}

#[derive(Clone, Debug)]
pub struct Unsubscribe<'a> {
	pub id: PacketId,
	pub filters: Vec<&'a str>,
}

nul_packet!(PingReq, 0xc0);
nul_packet!(Disconnect, 0xe0);

/// Return code carried by a ConnAck packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectReturnCode {
	Accepted,
	UnacceptableProtocolVersion,
	IdentifierRejected,
	ServerUnavailable,
	BadUsernameOrPassword,
	NotAuthorized,
	Other(u8),
}

impl From<u8> for ConnectReturnCode {
	fn from(value: u8) -> Self {
		match value {
			0x00 => Self::Accepted,
			0x01 => Self::UnacceptableProtocolVersion,
			0x02 => Self::IdentifierRejected,
			0x03 => Self::ServerUnavailable,
			0x04 => Self::BadUsernameOrPassword,
			0x05 => Self::NotAuthorized,
			other => Self::Other(other),
		}
	}
}

impl ConnectReturnCode {
	#[inline]
	pub fn is_accepted(self) -> bool {
		self == Self::Accepted
	}
}

/// Checks a string field which must fit behind a 2-byte length prefix.
fn check_len(len: usize, error: fn(usize) -> ValidationError) -> Result<()> {
	if len > MAX_STRING_LEN {
		Err(error(len))
	} else {
		Ok(())
	}
}

fn check_remaining(len: usize) -> Result<()> {
	if len > MAX_REMAINING_LENGTH {
		Err(ValidationError::PacketTooLarge(len))
	} else {
		Ok(())
	}
}

/// Topic names used in Publish packets may not be empty or contain wildcards.
fn check_topic(topic: &str) -> Result<()> {
	if topic.is_empty() {
		return Err(ValidationError::InvalidTopic("topic must not be empty"));
	}
	if topic.contains(['+', '#']) {
		return Err(ValidationError::InvalidTopic(
			"topic names must not contain wildcards",
		));
	}
	check_len(topic.len(), ValidationError::StringTooLong)
}

fn check_filter(filter: &str) -> Result<()> {
	if filter.is_empty() {
		return Err(ValidationError::InvalidTopic("topic filter must not be empty"));
	}
	check_len(filter.len(), ValidationError::StringTooLong)
}

/// Writes the fixed header: control byte followed by the remaining length.
fn put_header(dst: &mut BytesMut, control: u8, remaining_length: usize) -> Result<()> {
	dst.reserve(1 + varint::length_len(remaining_length) + remaining_length);
	serde::put_u8(dst, control);
	varint::put_var(dst, remaining_length)
}

mod connect {
	use super::*;

	const CONNECT_HEADER: u8 = 0x10;

	impl<'a> Connect<'a> {
		pub fn new(client_id: &'a str) -> Self {
			Self {
				protocol: ProtocolVersion::default(),
				client_id,
				keep_alive: 10,
				clean_session: true,
				will: None,
				credentials: None,
			}
		}

		/// Checks every field against the bounds MQTT places on it.
		pub fn validate(&self) -> Result<()> {
			if self.client_id.is_empty() {
				return Err(ValidationError::EmptyClientId);
			}
			check_len(self.client_id.len(), ValidationError::ClientIdTooLong)?;

			if let Some(will) = self.will {
				if will.topic.is_empty() {
					return Err(ValidationError::InvalidWill("will topic must not be empty"));
				}
				check_len(will.topic.len(), ValidationError::StringTooLong)?;
				if will.payload.len() > MAX_STRING_LEN {
					return Err(ValidationError::InvalidWill(
						"will message must not exceed 65535 bytes",
					));
				}
			}

			if let Some(credentials) = self.credentials {
				check_len(
					credentials.username.len(),
					ValidationError::UsernameTooLong,
				)?;
				if let Some(password) = &credentials.password {
					check_len(password.len(), ValidationError::PasswordTooLong)?;
				}
			}

			check_remaining(self.remaining_len())
		}

		fn remaining_len(&self) -> usize {
			let mut len = 2 + self.protocol.name().len() + 4 + (2 + self.client_id.len());

			if let Some(will) = self.will {
				len += 2 + will.topic.len() + 2 + will.payload.len();
			}

			if let Some(credentials) = self.credentials {
				len += 2 + credentials.username.len();
				if let Some(password) = &credentials.password {
					len += 2 + password.len();
				}
			}

			len
		}

		/// The connect-flags byte of the variable header.
		pub fn flags(&self) -> u8 {
			let mut flags = 0;

			if self.clean_session {
				flags |= 0x02;
			}

			if let Some(will) = self.will {
				flags |= 0x04;
				flags |= (will.qos as u8) << 3;
				if will.retain {
					flags |= 0x20;
				}
			}

			if let Some(credentials) = self.credentials {
				flags |= 0x80;
				if credentials.password.is_some() {
					flags |= 0x40;
				}
			}

			flags
		}
	}

	impl SerializePacket for Connect<'_> {
		fn serialize_into(&self, dst: &mut BytesMut) -> Result<()> {
			self.validate()?;

			put_header(dst, CONNECT_HEADER, self.remaining_len())?;

			// Write the protocol name and level.
			serde::put_str(dst, self.protocol.name())?;
			serde::put_u8(dst, self.protocol.level());

			// Write the flags and keep alive.
			serde::put_u8(dst, self.flags());
			serde::put_u16(dst, self.keep_alive);

			serde::put_str(dst, self.client_id)?;

			if let Some(will) = self.will {
				serde::put_str(dst, &will.topic)?;
				serde::put_prefixed(dst, &will.payload)?;
			}

			if let Some(credentials) = self.credentials {
				serde::put_str(dst, &credentials.username)?;
				if let Some(password) = &credentials.password {
					serde::put_str(dst, password)?;
				}
			}

			Ok(())
		}
	}
}

const PUBLISH_HEADER_CONTROL: u8 = 0x30;
const PUBLISH_HEADER_RETAIN_FLAG: u8 = 0x01;
const PUBLISH_HEADER_DUPLICATE_FLAG: u8 = 0x08;

impl<'a> Publish<'a> {
	/// Creates an [`AtMostOnce`](QoS::AtMostOnce) Publish packet.
	pub fn new(topic: &'a str, payload: &'a [u8]) -> Self {
		Self {
			topic,
			id: 0,
			qos: QoS::AtMostOnce,
			retain: false,
			duplicate: false,
			payload,
		}
	}

	fn remaining_len(&self) -> usize {
		let id_len = if self.qos > QoS::AtMostOnce { 2 } else { 0 };
		2 + self.topic.len() + id_len + self.payload.len()
	}

	fn control(&self) -> u8 {
		let mut control = PUBLISH_HEADER_CONTROL | (self.qos as u8) << 1;
		if self.retain {
			control |= PUBLISH_HEADER_RETAIN_FLAG;
		}
		if self.duplicate {
			control |= PUBLISH_HEADER_DUPLICATE_FLAG;
		}
		control
	}
}

impl SerializePacket for Publish<'_> {
	fn serialize_into(&self, dst: &mut BytesMut) -> Result<()> {
		check_topic(self.topic)?;
		let len = self.remaining_len();
		check_remaining(len)?;

		put_header(dst, self.control(), len)?;
		serde::put_str(dst, self.topic)?;
		if self.qos > QoS::AtMostOnce {
			serde::put_u16(dst, self.id);
		}
		dst.put_slice(self.payload);
		Ok(())
	}
}

impl<'a> Subscribe<'a> {
	/// Pairs each filter with the QoS at the same position.
	pub fn from_parts(id: PacketId, filters: &[&'a str], qos: &[QoS]) -> Result<Self> {
		if filters.len() != qos.len() {
			return Err(ValidationError::MismatchedQoS {
				topics: filters.len(),
				qos: qos.len(),
			});
		}

		Ok(Self {
			id,
			filters: filters.iter().copied().zip(qos.iter().copied()).collect(),
		})
	}
}

impl SerializePacket for Subscribe<'_> {
	fn serialize_into(&self, dst: &mut BytesMut) -> Result<()> {
		let Self { id, filters } = self;
		if filters.is_empty() {
			return Err(ValidationError::EmptySubscription);
		}
		for (filter, _) in filters {
			check_filter(filter)?;
		}

		let len = 2 + filters
			.iter()
			.fold(0usize, |acc, (filter, _)| acc + 3 + filter.len());
		check_remaining(len)?;

		put_header(dst, 0x82, len)?;
		serde::put_u16(dst, *id);
		for (filter, qos) in filters {
			serde::put_str(dst, filter)?;
			serde::put_u8(dst, *qos as u8);
		}

		Ok(())
	}
}

impl SerializePacket for Unsubscribe<'_> {
	fn serialize_into(&self, dst: &mut BytesMut) -> Result<()> {
		let Self { id, filters } = self;
		if filters.is_empty() {
			return Err(ValidationError::EmptySubscription);
		}
		for filter in filters {
			check_filter(filter)?;
		}

		let len = 2 + filters
			.iter()
			.fold(0usize, |acc, filter| acc + 2 + filter.len());
		check_remaining(len)?;

		put_header(dst, 0xa2, len)?;
		serde::put_u16(dst, *id);
		for filter in filters {
			serde::put_str(dst, filter)?;
		}

		Ok(())
	}
}

macro_rules! nul_packet {
	($name:tt,$header:literal) => {
		#[derive(Clone, Copy, Debug)]
		pub struct $name;

		impl SerializePacket for $name {
			fn serialize_into(&self, dst: &mut BytesMut) -> Result<()> {
				put_header(dst, $header, 0)
			}
		}
	};
}
use nul_packet;
