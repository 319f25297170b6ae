use std::time::Duration;

pub const DEFAULT_MQTT_HOST: &str = "localhost";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for connecting to a Server over TCP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpConfiguration {
	/// Hostname or IP address of the MQTT Server.
	pub host: String,
	pub port: u16,

	/// Upper bound on the blocking connect of a single attempt.
	pub connect_timeout: Duration,
}

impl Default for TcpConfiguration {
	fn default() -> Self {
		Self {
			host: DEFAULT_MQTT_HOST.into(),
			port: DEFAULT_MQTT_PORT,
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
		}
	}
}

impl<H: AsRef<str>> From<(H, u16)> for TcpConfiguration {
	#[inline]
	fn from((host, port): (H, u16)) -> Self {
		Self {
			host: host.as_ref().into(),
			port,
			..Default::default()
		}
	}
}

#[derive(thiserror::Error, Debug)]
#[error("the specified url scheme is not supported")]
pub struct UnsupportedScheme;

#[cfg(feature = "url")]
impl TryFrom<&url::Url> for TcpConfiguration {
	type Error = UnsupportedScheme;
	fn try_from(value: &url::Url) -> Result<Self, Self::Error> {
		match value.scheme() {
			"mqtt" | "tcp" => Ok(Self {
				host: value.host_str().unwrap_or(DEFAULT_MQTT_HOST).into(),
				port: value.port().unwrap_or(DEFAULT_MQTT_PORT),
				..Default::default()
			}),
			_ => Err(UnsupportedScheme),
		}
	}
}
