use crate::DecodeError;

/// MQTT control packet type, the upper nibble of the fixed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
	Connect = 1,
	ConnAck,
	Publish,
	PubAck,
	PubRec,
	PubRel,
	PubComp,
	Subscribe,
	SubAck,
	Unsubscribe,
	UnsubAck,
	PingReq,
	PingResp,
	Disconnect,
}

impl PacketType {
	/// Extracts the packet type from a fixed header byte.
	pub fn from_header(header: u8) -> Result<Self, DecodeError> {
		let packet_type = match header >> 4 {
			1 => Self::Connect,
			2 => Self::ConnAck,
			3 => Self::Publish,
			4 => Self::PubAck,
			5 => Self::PubRec,
			6 => Self::PubRel,
			7 => Self::PubComp,
			8 => Self::Subscribe,
			9 => Self::SubAck,
			10 => Self::Unsubscribe,
			11 => Self::UnsubAck,
			12 => Self::PingReq,
			13 => Self::PingResp,
			14 => Self::Disconnect,
			_ => return Err(DecodeError::InvalidHeader(header)),
		};
		Ok(packet_type)
	}

	#[inline]
	pub const fn code(self) -> u8 {
		self as u8
	}

	/// Whether the variable header of this packet type starts with a message id.
	#[inline]
	pub const fn is_acknowledgement(self) -> bool {
		matches!(
			self,
			Self::PubAck | Self::PubRec | Self::PubRel | Self::PubComp | Self::SubAck | Self::UnsubAck
		)
	}
}
