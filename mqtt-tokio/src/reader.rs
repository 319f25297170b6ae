use bytes::{Buf, BytesMut};
use mqtt_protocol::{varint, DecodeError, Message};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Initial capacity of the inbound buffer.
pub(crate) const READ_BUFFER_LEN: usize = 16 * 1024;

#[derive(Debug, Error)]
pub(crate) enum ReadError {
	/// The buffered bytes did not form a valid packet and were discarded.
	#[error("malformed packet: {0}")]
	Decode(#[from] DecodeError),

	/// The packet is dropped as it arrives, without being buffered.
	#[error("packet of {length} bytes exceeds the limit of {limit} bytes")]
	TooLarge { length: usize, limit: usize },
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Frames inbound bytes into packets by their remaining length.
#[derive(Debug)]
pub(crate) struct PacketReader<T> {
	stream: T,
	buffer: BytesMut,
	max_packet_size: Option<usize>,

	/// Bytes of an oversized packet still to be dropped.
	skip: usize,
}

impl<T> PacketReader<T> {
	pub fn new(stream: T, len: usize) -> Self {
		Self {
			stream,
			buffer: BytesMut::with_capacity(len),
			max_packet_size: None,
			skip: 0,
		}
	}

	/// Rejects packets longer than `limit` bytes, fixed header included.
	pub fn with_max_packet_size(mut self, limit: Option<usize>) -> Self {
		self.max_packet_size = limit;
		self
	}

	/// Attempts to take one complete packet from the buffer.
	///
	/// On a decode error the whole buffer is dropped, since there is no way to
	/// find the start of the next packet.
	pub fn parse_frame(&mut self) -> Result<Option<Message>, ReadError> {
		self.skip_buffered();
		if self.skip > 0 {
			return Ok(None);
		}

		match Message::check(&self.buffer) {
			Ok(extent) => {
				self.check_size(extent)?;
				let bytes = self.buffer.split_to(extent).freeze();
				Ok(Some(Message::parse(bytes)?))
			}
			Err(error) if error.is_incomplete() => {
				// The fixed header alone may declare an oversized packet.
				let declared = self.buffer.get(1..).map(varint::decode_length);
				if let Some(Ok((length, length_len))) = declared {
					self.check_size(1 + length_len + length)?;
				}
				Ok(None)
			}
			Err(error) => {
				self.buffer.clear();
				Err(error.into())
			}
		}
	}

	fn check_size(&mut self, extent: usize) -> Result<(), ReadError> {
		match self.max_packet_size {
			Some(limit) if extent > limit => {
				self.skip = extent;
				self.skip_buffered();
				Err(ReadError::TooLarge {
					length: extent,
					limit,
				})
			}
			_ => Ok(()),
		}
	}

	fn skip_buffered(&mut self) {
		let len = self.skip.min(self.buffer.len());
		self.buffer.advance(len);
		self.skip -= len;
	}
}

impl<T: AsyncRead + Unpin> PacketReader<T> {
	/// Reads the next packet from the stream.
	///
	/// Returns `Ok(None)` when the peer closed the stream between packets.
	pub async fn read_message(&mut self) -> Result<Option<Message>, ReadError> {
		loop {
			if let Some(message) = self.parse_frame()? {
				return Ok(Some(message));
			}

			if !self.buffer.is_empty() {
				tracing::trace!(buffered = self.buffer.len(), "waiting for the rest of a packet");
			}

			if 0 == self.stream.read_buf(&mut self.buffer).await? {
				// If nothing is pending the connection was shutdown cleanly,
				// otherwise the peer closed the socket while sending a packet.
				if self.buffer.is_empty() && self.skip == 0 {
					return Ok(None);
				} else {
					return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
				}
			}
		}
	}
}
