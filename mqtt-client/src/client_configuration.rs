use super::{client_options::ClientOptions, transport::TcpConfiguration};
use bytes::Bytes;
use mqtt_protocol::{
	misc::{Credentials, Will},
	packets::{Connect, SerializePacket},
	ProtocolVersion, ValidationError,
};
use std::time::Duration;

pub const DEFAULT_KEEP_ALIVE: u16 = 10;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Client configuration which is independent from the transport protocol.
///
/// The engine takes a copy of the configuration when a connect attempt starts,
/// so changes only apply to later attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfiguration {
	/// Keep alive interval in seconds. A value of 0 disables keep alive pings.
	///
	/// Defaults to 10 seconds.
	pub keep_alive: u16,
	pub clean_session: bool,
	pub client_id: String,
	pub protocol: ProtocolVersion,

	/// Username for authentication.
	pub username: Option<String>,

	/// Password for authentication.
	///
	/// This will be ignored if no username is set.
	pub password: Option<String>,
	pub will: Option<Will>,

	/// Controls whether the client should automatically reconnect after a
	/// failed attempt or a lost connection.
	pub reconnect: bool,

	/// Delay before an automatic reconnect attempt.
	pub reconnect_delay: Duration,

	/// Largest inbound packet accepted, fixed header included. Larger packets
	/// are dropped without being buffered.
	///
	/// Unlimited by default.
	pub max_packet_size: Option<usize>,
}

impl Default for ClientConfiguration {
	fn default() -> Self {
		Self {
			keep_alive: DEFAULT_KEEP_ALIVE,
			clean_session: true,
			client_id: Default::default(),
			protocol: Default::default(),
			username: Default::default(),
			password: Default::default(),
			will: Default::default(),
			reconnect: false,
			reconnect_delay: DEFAULT_RECONNECT_DELAY,
			max_packet_size: None,
		}
	}
}

impl ClientConfiguration {
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			..Default::default()
		}
	}

	/// Sets the client id from raw bytes, rejecting anything that is not valid
	/// UTF-8.
	///
	/// # Examples
	/// ```
	/// # use mqttlink_client::ClientConfiguration;
	/// let config = ClientConfiguration::default()
	/// 	.with_client_id_bytes("sensör".as_bytes())
	/// 	.unwrap();
	/// assert_eq!(config.client_id, "sensör");
	///
	/// assert!(ClientConfiguration::default()
	/// 	.with_client_id_bytes(&[0xc3, 0x28])
	/// 	.is_err());
	/// ```
	pub fn with_client_id_bytes(mut self, client_id: &[u8]) -> Result<Self, ValidationError> {
		let client_id = std::str::from_utf8(client_id).map_err(ValidationError::ClientIdEncoding)?;
		self.client_id = client_id.into();
		Ok(self)
	}

	pub fn credentials(&self) -> Option<Credentials> {
		self.username.as_ref().map(|username| Credentials {
			username: username.clone(),
			password: self.password.clone(),
		})
	}

	#[inline]
	pub fn keep_alive_interval(&self) -> Option<Duration> {
		match self.keep_alive {
			0 => None,
			seconds => Some(Duration::from_secs(seconds.into())),
		}
	}

	/// Encodes the Connect packet for this configuration.
	///
	/// Fails without producing any bytes when a field is out of bounds.
	pub fn encode_connect(&self) -> Result<Bytes, ValidationError> {
		let credentials = self.credentials();
		Connect {
			protocol: self.protocol,
			client_id: &self.client_id,
			keep_alive: self.keep_alive,
			clean_session: self.clean_session,
			will: self.will.as_ref(),
			credentials: credentials.as_ref(),
		}
		.to_bytes()
	}

	/// Checks the configuration without keeping the encoded packet.
	#[inline]
	pub fn validate(&self) -> Result<(), ValidationError> {
		self.encode_connect().map(drop)
	}

	#[cfg(feature = "url")]
	pub fn from_url(url: &url::Url) -> Self {
		let mut config = Self::default();

		if !url.username().is_empty() {
			config.username = Some(url.username().into());
		}
		config.password = url.password().map(|x| x.into());

		for (key, value) in url.query_pairs() {
			match key.as_ref() {
				"clean_session" => {
					let Ok(clean_session) = value.parse() else {
						continue;
					};
					config.clean_session = clean_session;
				}
				"client_id" => {
					config.client_id = value.into_owned();
				}
				"keep_alive" => {
					let Ok(keep_alive) = value.parse() else {
						continue;
					};
					config.keep_alive = keep_alive;
				}
				"reconnect" => {
					let Ok(reconnect) = value.parse() else {
						continue;
					};
					config.reconnect = reconnect;
				}
				"reconnect_delay" => {
					let Ok(millis) = value.parse() else {
						continue;
					};
					config.reconnect_delay = Duration::from_millis(millis);
				}
				"max_packet_size" => {
					let Ok(limit) = value.parse() else {
						continue;
					};
					config.max_packet_size = Some(limit);
				}
				"protocol" => {
					let Ok(protocol) = value.parse() else {
						continue;
					};
					config.protocol = protocol;
				}
				_ => {}
			}
		}

		config
	}

	pub fn into_options<T>(self, transport: T) -> ClientOptions
	where
		T: Into<TcpConfiguration>,
	{
		ClientOptions {
			transport: transport.into(),
			configuration: self,
		}
	}
}
