/// Selects the protocol name and level written into `Connect` packets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum ProtocolVersion {
	/// MQTT 3.1, protocol name `"MQIsdp"`, level 3.
	V31,
	/// MQTT 3.1.1, protocol name `"MQTT"`, level 4.
	#[default]
	V311,
}

impl ProtocolVersion {
	#[inline]
	pub const fn name(self) -> &'static str {
		match self {
			Self::V31 => "MQIsdp",
			Self::V311 => "MQTT",
		}
	}

	#[inline]
	pub const fn level(self) -> u8 {
		match self {
			Self::V31 => 0x03,
			Self::V311 => 0x04,
		}
	}
}

#[derive(Debug)]
pub struct UnknownVersion;

impl std::str::FromStr for ProtocolVersion {
	type Err = UnknownVersion;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"3.1" | "3" | "MQIsdp" => Ok(Self::V31),
			"3.1.1" | "4" | "MQTT" => Ok(Self::V311),
			_ => Err(UnknownVersion),
		}
	}
}
