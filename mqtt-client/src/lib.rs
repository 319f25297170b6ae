//! Transport-independent parts of the MQTT client: session configuration,
//! connection state, outbound events and message id allocation.

pub mod client_configuration;
pub mod client_options;
mod event;
mod message_id;
mod state;
pub mod transport;

pub use client_configuration::ClientConfiguration;
pub use client_options::ClientOptions;
pub use event::Event;
pub use message_id::MessageIdCounter;
pub use state::ConnectionState;
pub use transport::TcpConfiguration;
