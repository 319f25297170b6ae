use crate::engine::Engine;
use mqtt_client::{ClientOptions, ConnectionState};
use mqtt_protocol::{
	packets::{Publish, SerializePacket, Subscribe, Unsubscribe},
	PacketId, QoS, ValidationError,
};
use std::{io, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;

/// An asychronous MQTT client, based on the tokio runtime.
///
/// Cloned handles share the same connection.
#[derive(Clone)]
pub struct Client {
	engine: Arc<Engine>,
}

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("invalid packet: {0}")]
	Validation(#[from] ValidationError),
	#[error("not connected")]
	NotConnected,
	#[error("transport error: {0}")]
	Transport(#[from] io::Error),
}

impl Client {
	pub(crate) fn new(engine: Arc<Engine>) -> Self {
		Self { engine }
	}

	/// Replaces the options used by later connect attempts.
	pub async fn configure(&self, options: ClientOptions) {
		self.engine.configure(options).await
	}

	/// Starts connecting to the Server.
	///
	/// Any existing connection or attempt is closed first. Progress is reported
	/// through [`Event::StateChanged`]; this call returns once the attempt has
	/// started. Fails without touching the network if the configuration is
	/// invalid.
	///
	/// [`Event::StateChanged`]: mqtt_client::Event::StateChanged
	pub async fn connect(&self) -> Result<(), ClientError> {
		self.engine.connect().await?;
		Ok(())
	}

	/// Sends a Disconnect packet if connected, then closes the connection and
	/// cancels any pending reconnect. Always reports
	/// [`ConnectionState::None`].
	pub async fn disconnect(&self) {
		self.engine.disconnect().await
	}

	/// Publishes `payload` to `topic` with [`AtMostOnce`](QoS::AtMostOnce).
	///
	/// # Example
	///
	/// ```no_run
	/// # tokio_test::block_on(async {
	/// use mqtt_client::{ClientConfiguration, TcpConfiguration};
	/// use mqttlink_tokio::create_client;
	///
	/// let options = ClientConfiguration::new("example")
	/// 	.into_options(TcpConfiguration::from(("localhost", 1883)));
	/// let (client, _events) = create_client(options);
	/// client.connect().await.unwrap();
	///
	/// let id = client.publish("a/b", "Hello, world!", false).await;
	/// # })
	/// ```
	#[inline]
	pub async fn publish(
		&self,
		topic: &str,
		payload: impl AsRef<[u8]>,
		retain: bool,
	) -> Result<PacketId, ClientError> {
		self.publish_with_qos(topic, payload, QoS::AtMostOnce, retain)
			.await
	}

	/// Publishes `payload` to `topic` and returns the message id allocated for
	/// it.
	///
	/// The id is only written to the packet when `qos` is above
	/// [`AtMostOnce`](QoS::AtMostOnce). Acknowledgements from the Server are
	/// delivered as events but are not awaited.
	pub async fn publish_with_qos(
		&self,
		topic: &str,
		payload: impl AsRef<[u8]>,
		qos: QoS,
		retain: bool,
	) -> Result<PacketId, ClientError> {
		let id = self.engine.ids.allocate();
		let bytes = Publish {
			id,
			qos,
			retain,
			..Publish::new(topic, payload.as_ref())
		}
		.to_bytes()?;

		self.engine.write(bytes).await?;
		Ok(id)
	}

	/// Subscribes to a single topic filter.
	#[inline]
	pub async fn subscribe(&self, filter: &str, qos: QoS) -> Result<PacketId, ClientError> {
		self.subscribe_many(&[filter], &[qos]).await
	}

	/// Subscribes to several topic filters in one packet. `qos[i]` is requested
	/// for `filters[i]`.
	pub async fn subscribe_many(
		&self,
		filters: &[&str],
		qos: &[QoS],
	) -> Result<PacketId, ClientError> {
		let id = self.engine.ids.allocate();
		let bytes = Subscribe::from_parts(id, filters, qos)?.to_bytes()?;

		self.engine.write(bytes).await?;
		Ok(id)
	}

	pub async fn unsubscribe(&self, filter: &str) -> Result<PacketId, ClientError> {
		let id = self.engine.ids.allocate();
		let bytes = Unsubscribe {
			id,
			filters: vec![filter],
		}
		.to_bytes()?;

		self.engine.write(bytes).await?;
		Ok(id)
	}

	/// Calls [`connect`](Self::connect) once after `delay`, whether or not
	/// automatic reconnects are enabled. Replaces any reconnect already
	/// scheduled.
	pub async fn schedule_reconnect(&self, delay: Duration) {
		self.engine.schedule_reconnect(delay).await
	}

	#[inline]
	pub fn state(&self) -> ConnectionState {
		self.engine.state()
	}

	/// Returns a receiver that observes the latest connection state.
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.engine.watch_state()
	}
}
