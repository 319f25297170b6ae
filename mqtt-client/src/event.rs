use crate::ConnectionState;
use bytes::Bytes;
use mqtt_protocol::Message;

/// Notifications delivered to the embedding application, one per occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
	/// The connection moved to a new state.
	StateChanged(ConnectionState),

	/// A packet was received and decoded.
	MessageReceived(Message),

	/// Bytes were written to the transport.
	RawPublished(Bytes),
}
