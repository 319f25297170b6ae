//! # MQTT protocol
//!
//! Encoding and decoding of MQTT 3.1 and 3.1.1 control packets. This crate
//! performs no I/O.
pub mod bytes_reader;
mod error;
mod message;
pub mod misc;
mod packet_type;
pub mod packets;
mod qos;
mod serde;
pub mod varint;
mod version;

pub use error::{DecodeError, ValidationError};
pub use message::{decode, Message, VariableHeader};
pub use packet_type::PacketType;
pub use packets::{ConnectReturnCode, SerializePacket};
pub use qos::{InvalidQoS, QoS};
pub use version::{ProtocolVersion, UnknownVersion};

/// Message identifier carried by Publish (QoS > 0), Subscribe and Unsubscribe
/// packets and their acknowledgements.
pub type PacketId = u16;
