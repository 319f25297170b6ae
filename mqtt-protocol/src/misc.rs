use crate::QoS;
use bytes::Bytes;

/// Username and password used to authenticate the Client with the Server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	pub username: String,
	pub password: Option<String>,
}

impl Credentials {
	/// Creates a new Credentials instance with the specified username.
	///
	/// # Examples
	/// ```
	/// # use mqttlink_protocol::misc::Credentials;
	/// let credentials = Credentials::new("sensor");
	/// assert_eq!(credentials.username, "sensor");
	/// assert_eq!(credentials.password, None);
	/// ```
	pub fn new(username: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: None,
		}
	}

	/// Replaces the password field with the specified password.
	///
	/// # Examples
	/// ```
	/// # use mqttlink_protocol::misc::Credentials;
	/// let credentials = Credentials::new("sensor").set_password("secret");
	/// assert_eq!(credentials.password.as_deref(), Some("secret"));
	/// ```
	pub fn set_password(mut self, password: impl Into<String>) -> Self {
		self.password.replace(password.into());
		self
	}
}

impl From<&str> for Credentials {
	#[inline]
	fn from(username: &str) -> Self {
		Self::new(username)
	}
}

impl From<(&str, &str)> for Credentials {
	#[inline]
	fn from((username, password): (&str, &str)) -> Self {
		Self::new(username).set_password(password)
	}
}

/// Will Message
///
/// The will message is set by the Client when it connects to the Server. If the
/// Client disconnects abnormally, the Server publishes the will message to the
/// topic on behalf of the Client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Will {
	/// The topic to publish the will message to.
	pub topic: String,

	/// The message to publish as the will.
	pub payload: Bytes,

	/// The quality of service to publish the will message at.
	pub qos: QoS,

	/// Whether or not the will message should be retained.
	pub retain: bool,
}

impl Will {
	pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS, retain: bool) -> Self {
		Self {
			topic: topic.into(),
			payload: payload.into(),
			qos,
			retain,
		}
	}
}
