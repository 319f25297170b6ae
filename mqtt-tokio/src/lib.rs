//! MQTT connection engine for the tokio runtime.
//!
//! [`create_client`] returns a [`Client`] handle and the receiving end of the
//! event channel. All state changes and received packets are reported as
//! [`Event`]s on that channel.
mod client;
mod connector;
mod engine;
mod keepalive;
mod reader;
mod write_gate;

use engine::Engine;
use mqtt_client::{ClientOptions, Event};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use client::{Client, ClientError};
pub use connector::{AsyncReadWrite, BoxedStream, ConnectFuture, Connector, TcpConnector};

pub type EventRx = mpsc::UnboundedReceiver<Event>;

/// Creates a client which connects over TCP.
///
/// No connection is made until [`Client::connect`] is called.
pub fn create_client(options: ClientOptions) -> (Client, EventRx) {
	create_client_with_connector(options, TcpConnector)
}

pub fn create_client_with_connector(
	options: ClientOptions,
	connector: impl Connector,
) -> (Client, EventRx) {
	let (events_tx, events_rx) = mpsc::unbounded_channel();
	let engine = Engine::new(options, Box::new(connector), events_tx);
	(Client::new(Arc::new(engine)), events_rx)
}
