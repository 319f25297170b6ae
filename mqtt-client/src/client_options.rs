use super::{client_configuration::ClientConfiguration, transport::TcpConfiguration};

#[cfg(feature = "url")]
use super::transport::UnsupportedScheme;

/// Everything the engine needs for a connect attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientOptions {
	pub transport: TcpConfiguration,
	pub configuration: ClientConfiguration,
}

impl ClientOptions {
	/// Creates a new `ClientOptions` instance with specified transport and
	/// configuration.
	pub fn new(transport: TcpConfiguration, configuration: ClientConfiguration) -> Self {
		Self {
			transport,
			configuration,
		}
	}

	#[cfg(feature = "url")]
	pub fn try_from_url(url: &url::Url) -> Result<Self, UnsupportedScheme> {
		let transport = url.try_into()?;
		let configuration = ClientConfiguration::from_url(url);
		Ok(Self {
			transport,
			configuration,
		})
	}
}

#[cfg(feature = "url")]
impl TryFrom<&url::Url> for ClientOptions {
	type Error = UnsupportedScheme;
	#[inline]
	fn try_from(value: &url::Url) -> Result<Self, Self::Error> {
		Self::try_from_url(value)
	}
}

#[cfg(feature = "url")]
impl TryFrom<url::Url> for ClientOptions {
	type Error = UnsupportedScheme;
	#[inline]
	fn try_from(value: url::Url) -> Result<Self, Self::Error> {
		Self::try_from(&value)
	}
}

#[cfg(feature = "url")]
impl TryFrom<&str> for ClientOptions {
	type Error = UnsupportedScheme;
	#[inline]
	fn try_from(value: &str) -> Result<Self, Self::Error> {
		let url: url::Url = value.try_into().map_err(|_| UnsupportedScheme)?;
		Self::try_from(url)
	}
}
