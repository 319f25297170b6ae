/// State of the single connection managed by a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum ConnectionState {
	/// No connection and no attempt in progress.
	#[default]
	None,
	Connecting,
	Connected,
	/// The last connect attempt could not open a socket.
	ConnectionFailed,
}

impl ConnectionState {
	#[inline]
	pub fn is_connected(self) -> bool {
		self == Self::Connected
	}
}
