#![allow(clippy::tabs_in_doc_comments)]
//! # mqttlink
//!
//! An MQTT 3.1 and 3.1.1 client: packet codec, session configuration and, with
//! the `tokio-client` feature, a connection engine with keep alive and
//! reconnect.
//!
//! ```no_run
//! # #[cfg(feature = "tokio-client")]
//! # tokio_test::block_on(async {
//! use mqttlink::{
//! 	create_client, ClientConfiguration, ConnectionState, Event, QoS, TcpConfiguration,
//! };
//!
//! let options = ClientConfiguration::new("example").into_options(TcpConfiguration::default());
//! let (client, mut events) = create_client(options);
//! client.connect().await.unwrap();
//!
//! while let Some(event) = events.recv().await {
//! 	match event {
//! 		Event::StateChanged(ConnectionState::Connected) => {
//! 			client.subscribe("sensors/#", QoS::AtMostOnce).await.unwrap();
//! 		}
//! 		Event::MessageReceived(message) => println!("{message:?}"),
//! 		_ => {}
//! 	}
//! }
//! # });
//! ```
pub use mqtt_client::*;
pub use mqtt_protocol::*;

#[cfg(feature = "tokio-client")]
pub use mqtt_tokio::{
	create_client, create_client_with_connector, Client, ClientError, Connector, EventRx,
	TcpConnector,
};
