use crate::{
	bytes_reader::BytesReader, packets::ConnectReturnCode, varint, DecodeError, PacketId,
	PacketType, QoS,
};
use bytes::Bytes;
use std::fmt;

/// Fields found between the fixed header and the payload.
///
/// Which fields are present depends on the packet type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableHeader {
	/// Publish topic.
	pub topic_name: Option<String>,

	/// Present on Publish packets with QoS above 0 and on acknowledgements.
	pub message_id: Option<PacketId>,

	/// ConnAck return code.
	pub return_code: Option<ConnectReturnCode>,

	/// ConnAck session-present flag (MQTT 3.1.1).
	pub session_present: Option<bool>,
}

/// A decoded MQTT control packet.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
	pub packet_type: PacketType,
	pub duplicate: bool,
	pub qos: QoS,
	pub retain: bool,

	/// Byte length of the variable header and payload, as declared in the
	/// fixed header.
	pub remaining_length: usize,
	pub variable_header: VariableHeader,
	pub payload: Bytes,
}

/// Decodes a single packet from the start of `src`.
///
/// Bytes after the declared remaining length are ignored.
#[inline]
pub fn decode(src: &[u8]) -> Result<Message, DecodeError> {
	let len = Message::check(src)?;
	Message::parse(Bytes::copy_from_slice(&src[..len]))
}

impl Message {
	/// Checks whether `src` starts with a complete packet. If so, returns the
	/// length of that packet including its fixed header.
	pub fn check(src: &[u8]) -> Result<usize, DecodeError> {
		let Some(&header) = src.first() else {
			return Err(DecodeError::Incomplete);
		};
		PacketType::from_header(header)?;

		let (length, length_len) = varint::decode_length(&src[1..])?;
		let extent = 1 + length_len + length;
		if src.len() < extent {
			return Err(DecodeError::Incomplete);
		}

		Ok(extent)
	}

	/// Parses a packet from `buffer`, which must start with the fixed header.
	pub fn parse(buffer: Bytes) -> Result<Self, DecodeError> {
		let mut reader = BytesReader::new(buffer);

		let header = reader.take_u8()?;
		let packet_type = PacketType::from_header(header)?;
		let qos = QoS::try_from((header >> 1) & 0x03)
			.map_err(|_| DecodeError::InvalidQoS(header))?;
		let duplicate = header & 0x08 == 0x08;
		let retain = header & 0x01 == 0x01;

		let remaining_length = reader.take_var()?;
		let body = reader.take_bytes(remaining_length)?;

		let mut body = BytesReader::new(body);
		let variable_header =
			parse_variable_header(packet_type, qos, &mut body).map_err(|error| match error {
				// The frame is complete, so running out of bytes means a field
				// claims more than the remaining length.
				DecodeError::Incomplete => {
					DecodeError::MalformedPacket("variable header exceeds remaining length")
				}
				error => error,
			})?;

		Ok(Self {
			packet_type,
			duplicate,
			qos,
			retain,
			remaining_length,
			variable_header,
			payload: body.take_inner(),
		})
	}

	/// The topic of a Publish packet.
	#[inline]
	pub fn topic(&self) -> Option<&str> {
		self.variable_header.topic_name.as_deref()
	}

	#[inline]
	pub fn message_id(&self) -> Option<PacketId> {
		self.variable_header.message_id
	}
}

fn parse_variable_header(
	packet_type: PacketType,
	qos: QoS,
	body: &mut BytesReader,
) -> Result<VariableHeader, DecodeError> {
	let mut variable_header = VariableHeader::default();

	match packet_type {
		PacketType::ConnAck => {
			let flags = body.take_u8()?;
			let code = body.take_u8()?;
			variable_header.session_present = Some(flags & 0x01 == 0x01);
			variable_header.return_code = Some(code.into());
		}
		PacketType::Publish => {
			variable_header.topic_name = Some(body.take_str()?);
			if qos > QoS::AtMostOnce {
				variable_header.message_id = Some(body.take_u16()?);
			}
		}
		PacketType::PubAck
		| PacketType::PubRec
		| PacketType::PubRel
		| PacketType::PubComp
		| PacketType::SubAck
		| PacketType::UnsubAck => {
			variable_header.message_id = Some(body.take_u16()?);
		}
		// Not expected from a Server; only the fixed header is decoded.
		PacketType::Connect
		| PacketType::Subscribe
		| PacketType::Unsubscribe
		| PacketType::PingReq
		| PacketType::PingResp
		| PacketType::Disconnect => {}
	}

	Ok(variable_header)
}

impl fmt::Debug for Message {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Message")
			.field("type", &self.packet_type)
			.field("qos", &self.qos)
			.field("retain", &self.retain)
			.field("duplicate", &self.duplicate)
			.field("remaining length", &self.remaining_length)
			.field("variable header", &self.variable_header)
			.field("payload length", &self.payload.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::packets::{Publish, SerializePacket};

	#[test]
	fn publish_round_trips_for_every_qos() {
		for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
			let large = [0u8; 300];
			for (topic, payload) in [("a/b", &b"hi"[..]), ("sensors/temp", &b""[..]), ("t", &large[..])] {
				let bytes = Publish {
					id: 42,
					qos,
					..Publish::new(topic, payload)
				}
				.to_bytes()
				.unwrap();

				let message = decode(&bytes).unwrap();
				assert_eq!(message.packet_type, PacketType::Publish);
				assert_eq!(message.qos, qos);
				assert_eq!(message.topic(), Some(topic));
				assert_eq!(&message.payload[..], payload);
				let header_len = 1 + varint::length_len(message.remaining_length);
				assert_eq!(message.remaining_length, bytes.len() - header_len);
			}
		}
	}

	#[test]
	fn qos_0_publish_has_no_message_id() {
		// Were a message id read here, the payload would lose its first two bytes.
		let message = decode(&[0x30, 7, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']).unwrap();
		assert_eq!(message.topic(), Some("a/b"));
		assert_eq!(message.message_id(), None);
		assert_eq!(&message.payload[..], b"hi");
	}

	#[test]
	fn qos_1_publish_exposes_message_id() {
		let message =
			decode(&[0x32, 9, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x07, b'h', b'i']).unwrap();
		assert_eq!(message.qos, QoS::AtLeastOnce);
		assert_eq!(message.message_id(), Some(7));
		assert_eq!(&message.payload[..], b"hi");
	}

	#[test]
	fn connack() {
		let message = decode(&[0x20, 0x02, 0x01, 0x05]).unwrap();
		assert_eq!(message.packet_type, PacketType::ConnAck);
		assert_eq!(
			message.variable_header.return_code,
			Some(ConnectReturnCode::NotAuthorized)
		);
		assert_eq!(message.variable_header.session_present, Some(true));
		assert!(message.payload.is_empty());
	}

	#[test]
	fn acknowledgements_carry_ids() {
		for header in [0x40, 0x50, 0x62, 0x70, 0xb0] {
			let message = decode(&[header, 0x02, 0x12, 0x34]).unwrap();
			assert!(message.packet_type.is_acknowledgement());
			assert_eq!(message.message_id(), Some(0x1234));
		}

		let suback = decode(&[0x90, 0x04, 0x00, 0x09, 0x01, 0x80]).unwrap();
		assert_eq!(suback.message_id(), Some(9));
		assert_eq!(&suback.payload[..], &[0x01, 0x80]);
	}

	#[test]
	fn pingresp_and_disconnect() {
		let message = decode(&[0xd0, 0x00]).unwrap();
		assert_eq!(message.packet_type, PacketType::PingResp);
		assert_eq!(message.remaining_length, 0);
		assert_eq!(message.variable_header, VariableHeader::default());

		assert_eq!(decode(&[0xe0, 0x00]).unwrap().packet_type, PacketType::Disconnect);
	}

	#[test]
	fn remaining_length_bounds_the_payload() {
		// Two packets in one buffer: only the first is decoded.
		let message = decode(&[0x30, 0x05, 0x00, 0x01, b't', b'x', b'y', 0xd0, 0x00]).unwrap();
		assert_eq!(&message.payload[..], b"xy");
		assert_eq!(Message::check(&[0x30, 0x05, 0x00, 0x01, b't', b'x', b'y', 0xd0, 0x00]), Ok(7));
	}

	#[test]
	fn truncated_input_is_an_error() {
		assert_eq!(decode(&[]), Err(DecodeError::Incomplete));
		assert_eq!(decode(&[0x30]), Err(DecodeError::Incomplete));
		// One byte of a three byte remaining length.
		assert_eq!(decode(&[0x30, 0x80]), Err(DecodeError::Incomplete));
		assert_eq!(decode(&[0x30, 0x80, 0x80]), Err(DecodeError::Incomplete));
		// Declared length longer than the buffer.
		assert_eq!(decode(&[0x30, 0x09, 0x00, 0x03, b'a']), Err(DecodeError::Incomplete));
	}

	#[test]
	fn malformed_input_is_an_error() {
		assert_eq!(
			decode(&[0x30, 0xff, 0xff, 0xff, 0xff, 0x01]),
			Err(DecodeError::MalformedLength)
		);
		assert_eq!(decode(&[0x00, 0x00]), Err(DecodeError::InvalidHeader(0x00)));
		assert_eq!(decode(&[0xf0, 0x00]), Err(DecodeError::InvalidHeader(0xf0)));
		assert_eq!(decode(&[0x36, 0x00]), Err(DecodeError::InvalidQoS(0x36)));
		// Topic length points past the end of the frame.
		assert!(matches!(
			decode(&[0x30, 0x03, 0x00, 0x09, b'a']),
			Err(DecodeError::MalformedPacket(_))
		));
		assert!(matches!(
			decode(&[0x20, 0x01, 0x00]),
			Err(DecodeError::MalformedPacket(_))
		));
		assert!(matches!(
			decode(&[0x30, 0x04, 0x00, 0x02, 0xc3, 0x28]),
			Err(DecodeError::Utf8(_))
		));
	}
}
