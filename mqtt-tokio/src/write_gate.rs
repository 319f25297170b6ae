use crate::connector::BoxedStream;
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::{
	io::{AsyncWrite, AsyncWriteExt, WriteHalf},
	sync::{watch, Mutex},
};

#[derive(Debug, Error)]
pub(crate) enum GateError {
	#[error("no live connection")]
	Closed,

	/// The write failed and the gate has been closed.
	#[error("write failed on connection {generation}: {error}")]
	Io { generation: u64, error: io::Error },
}

/// The output half of one connection.
struct Sink {
	generation: u64,
	writer: Mutex<Option<WriteHalf<BoxedStream>>>,
	closed: watch::Sender<bool>,
}

impl Sink {
	fn new(generation: u64, writer: WriteHalf<BoxedStream>) -> Self {
		let (closed, _) = watch::channel(false);
		Self {
			generation,
			writer: Mutex::new(Some(writer)),
			closed,
		}
	}

	/// Writes `buffer` unless the sink is shut down first, in which case the
	/// write is abandoned part way.
	async fn write(&self, buffer: &[u8]) -> Result<(), GateError> {
		let mut closed = self.closed.subscribe();
		let write = async {
			let mut writer = self.writer.lock().await;
			let writer = writer.as_mut().ok_or(GateError::Closed)?;
			write_all(writer, buffer)
				.await
				.map_err(|error| GateError::Io {
					generation: self.generation,
					error,
				})
		};

		tokio::select! {
			result = write => result,
			_ = closed.wait_for(|closed| *closed) => Err(GateError::Closed),
		}
	}

	/// Abandons any write in progress and drops the writer.
	async fn shutdown(&self) {
		self.closed.send_replace(true);
		self.writer.lock().await.take();
	}
}

/// Serializes writes to the output half of the live connection.
///
/// Callers wait for their turn rather than queueing, so a write returns only
/// once its bytes have been handed to the transport. Closing the gate never
/// waits for a stalled write: the write is abandoned and its caller sees
/// [`GateError::Closed`].
pub(crate) struct WriteGate {
	sink: Mutex<Option<Arc<Sink>>>,
}

impl WriteGate {
	pub fn new() -> Self {
		Self {
			sink: Mutex::new(None),
		}
	}

	/// Installs `writer` as the live sink, closing any previous one.
	pub async fn open(&self, generation: u64, writer: WriteHalf<BoxedStream>) {
		let sink = Arc::new(Sink::new(generation, writer));
		let previous = self.sink.lock().await.replace(sink);
		if let Some(previous) = previous {
			previous.shutdown().await;
		}
	}

	/// Drops the live sink, if any. Returns once its writer has been dropped.
	pub async fn close(&self) {
		let sink = self.sink.lock().await.take();
		if let Some(sink) = sink {
			sink.shutdown().await;
		}
	}

	pub async fn write(&self, buffer: &[u8]) -> Result<(), GateError> {
		let sink = self.sink.lock().await.clone().ok_or(GateError::Closed)?;

		let result = sink.write(buffer).await;
		if let Err(GateError::Io { .. }) = result {
			let mut current = self.sink.lock().await;
			if current.as_ref().is_some_and(|live| Arc::ptr_eq(live, &sink)) {
				current.take();
			}
			drop(current);
			sink.shutdown().await;
		}
		result
	}
}

pub(crate) async fn write_all<W>(writer: &mut W, buffer: &[u8]) -> io::Result<()>
where
	W: AsyncWrite + Unpin,
{
	tracing::trace!("writing {} bytes to stream", buffer.len());
	writer.write_all(buffer).await?;
	writer.flush().await
}
