use mqtt_client::TcpConfiguration;
use std::{future::Future, io, pin::Pin};
use tokio::{
	io::{AsyncRead, AsyncWrite},
	net::TcpStream,
};

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> AsyncReadWrite for T {}

/// The byte stream of one connection.
pub type BoxedStream = Box<dyn AsyncReadWrite + Unpin>;

pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = io::Result<BoxedStream>> + Send + 'a>>;

/// Opens the transport for a connect attempt.
///
/// The engine drops the returned future when the attempt is superseded, and
/// drops the stream to close the connection.
pub trait Connector: Send + Sync + 'static {
	fn connect<'a>(&'a self, transport: &'a TcpConfiguration) -> ConnectFuture<'a>;
}

/// Connects over plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
	fn connect<'a>(&'a self, transport: &'a TcpConfiguration) -> ConnectFuture<'a> {
		Box::pin(async move {
			let stream = TcpStream::connect((transport.host.as_str(), transport.port)).await?;
			stream.set_nodelay(true)?;
			Ok(Box::new(stream) as BoxedStream)
		})
	}
}
