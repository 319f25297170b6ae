use crate::{
	connector::{BoxedStream, Connector},
	keepalive::{self, KeepAliveClock},
	reader::{PacketReader, ReadError, READ_BUFFER_LEN},
	write_gate::{self, GateError, WriteGate},
	ClientError,
};
use bytes::Bytes;
use mqtt_client::{ClientOptions, ConnectionState, Event, MessageIdCounter, TcpConfiguration};
use mqtt_protocol::{
	packets::{self, SerializePacket},
	Message, PacketType, ValidationError,
};
use std::{io, sync::Arc, time::Duration};
use tokio::{
	io::ReadHalf,
	sync::{mpsc, watch, Mutex},
	task::JoinHandle,
	time,
};

pub(crate) type EventTx = mpsc::UnboundedSender<Event>;

/// How long `disconnect` waits to send Disconnect before closing anyway.
pub(crate) const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything guarded by the transition lock.
struct Control {
	options: ClientOptions,

	/// Identifies the current attempt or connection. Bumped whenever workers are
	/// cancelled, so reports from older workers can be recognised and ignored.
	generation: u64,
	connect_task: Option<JoinHandle<()>>,
	read_task: Option<JoinHandle<()>>,
	keep_alive_task: Option<JoinHandle<()>>,
	reconnect_task: Option<JoinHandle<()>>,
	reconnect_seq: u64,
}

/// Configuration captured when a connect attempt starts.
struct Attempt {
	generation: u64,
	transport: TcpConfiguration,
	connect: Bytes,
	keep_alive: Option<Duration>,
	max_packet_size: Option<usize>,
}

/// Owns the single connection of a client and the workers serving it.
///
/// State transitions and worker start/stop happen while holding `control`.
/// Workers never cancel themselves: the connect worker reports inline and only
/// detaches its own handle, while the read worker, the keep alive monitor and
/// failed writes hand connection loss to a fresh task.
pub(crate) struct Engine {
	control: Mutex<Control>,
	state: watch::Sender<ConnectionState>,
	gate: WriteGate,
	pub(crate) clock: KeepAliveClock,
	pub(crate) ids: MessageIdCounter,
	events: EventTx,
	connector: Box<dyn Connector>,
}

impl Engine {
	pub fn new(options: ClientOptions, connector: Box<dyn Connector>, events: EventTx) -> Self {
		let (state, _) = watch::channel(ConnectionState::None);
		Self {
			control: Mutex::new(Control {
				options,
				generation: 0,
				connect_task: None,
				read_task: None,
				keep_alive_task: None,
				reconnect_task: None,
				reconnect_seq: 0,
			}),
			state,
			gate: WriteGate::new(),
			clock: KeepAliveClock::new(),
			ids: MessageIdCounter::new(),
			events,
			connector,
		}
	}

	#[inline]
	pub fn state(&self) -> ConnectionState {
		*self.state.borrow()
	}

	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.state.subscribe()
	}

	fn set_state(&self, state: ConnectionState) {
		tracing::debug!(?state, "connection state changed");
		self.state.send_replace(state);
		self.emit(Event::StateChanged(state));
	}

	fn emit(&self, event: Event) {
		// The application may have dropped its receiver.
		let _ = self.events.send(event);
	}

	pub async fn configure(&self, options: ClientOptions) {
		tracing::debug!(transport = ?options.transport, "configured");
		self.control.lock().await.options = options;
	}

	/// Cancels any previous attempt or connection and starts a new attempt.
	///
	/// An invalid configuration is rejected before anything is cancelled.
	pub async fn connect(self: &Arc<Self>) -> Result<(), ValidationError> {
		let mut control = self.control.lock().await;
		self.connect_locked(&mut control).await
	}

	async fn connect_locked(self: &Arc<Self>, control: &mut Control) -> Result<(), ValidationError> {
		let connect = control.options.configuration.encode_connect()?;

		if let Some(task) = control.reconnect_task.take() {
			task.abort();
		}
		self.cancel_workers(control).await;

		let attempt = Attempt {
			generation: control.generation,
			transport: control.options.transport.clone(),
			connect,
			keep_alive: control.options.configuration.keep_alive_interval(),
			max_packet_size: control.options.configuration.max_packet_size,
		};

		tracing::info!(
			host = %attempt.transport.host,
			port = attempt.transport.port,
			"connecting"
		);
		self.set_state(ConnectionState::Connecting);
		control.connect_task = Some(tokio::spawn(Arc::clone(self).connect_worker(attempt)));
		Ok(())
	}

	async fn connect_worker(self: Arc<Self>, attempt: Attempt) {
		let transport = &attempt.transport;
		let timeout = transport.connect_timeout;
		let open = async {
			let mut stream = self.connector.connect(transport).await?;
			// Connect goes out before the stream is shared with any other writer.
			write_gate::write_all(&mut stream, &attempt.connect).await?;
			Ok::<_, io::Error>(stream)
		};

		let result = time::timeout(timeout, open).await;
		match result {
			Ok(Ok(stream)) => self.connected(attempt, stream).await,
			Ok(Err(error)) => {
				tracing::error!(?error, "failed to connect");
				self.connection_failed(attempt.generation).await;
			}
			Err(_) => {
				tracing::error!(?timeout, "timed out connecting");
				self.connection_failed(attempt.generation).await;
			}
		}
	}

	async fn connected(self: &Arc<Self>, attempt: Attempt, stream: BoxedStream) {
		let mut control = self.control.lock().await;
		if control.generation != attempt.generation {
			tracing::debug!("dropping connection of a superseded attempt");
			return;
		}
		// Dropping the handle detaches the running connect worker.
		control.connect_task.take();

		let generation = attempt.generation;
		let (reader, writer) = tokio::io::split(stream);
		self.clock.reset();

		let reader =
			PacketReader::new(reader, READ_BUFFER_LEN).with_max_packet_size(attempt.max_packet_size);
		control.read_task = Some(tokio::spawn(Arc::clone(self).read_worker(generation, reader)));
		if let Some(interval) = attempt.keep_alive {
			control.keep_alive_task = Some(tokio::spawn(keepalive::monitor(
				Arc::clone(self),
				generation,
				interval,
			)));
		}

		self.gate.open(generation, writer).await;
		self.clock.touch();
		self.emit(Event::RawPublished(attempt.connect));

		tracing::info!("connected");
		self.set_state(ConnectionState::Connected);
	}

	async fn connection_failed(self: &Arc<Self>, generation: u64) {
		let mut control = self.control.lock().await;
		if control.generation != generation {
			return;
		}
		control.connect_task.take();

		self.set_state(ConnectionState::ConnectionFailed);
		self.reconnect_if_enabled(&mut control);
	}

	pub(crate) fn spawn_connection_lost(self: &Arc<Self>, generation: u64) {
		tokio::spawn(Arc::clone(self).connection_lost(generation));
	}

	async fn connection_lost(self: Arc<Self>, generation: u64) {
		let mut control = self.control.lock().await;
		if control.generation != generation || !self.state().is_connected() {
			return;
		}

		tracing::info!("connection lost");
		self.lost_locked(&mut control).await;
	}

	async fn lost_locked(self: &Arc<Self>, control: &mut Control) {
		self.cancel_workers(control).await;
		self.set_state(ConnectionState::None);
		self.reconnect_if_enabled(control);
	}

	/// Sends Disconnect if connected, waiting at most [`DISCONNECT_TIMEOUT`]
	/// for the transport to accept it. Then closes the connection and cancels
	/// every worker, including a pending reconnect.
	pub async fn disconnect(self: &Arc<Self>) {
		let mut control = self.control.lock().await;

		if self.state().is_connected() {
			match packets::Disconnect.to_bytes() {
				Ok(bytes) => match time::timeout(DISCONNECT_TIMEOUT, self.write(bytes)).await {
					Ok(Ok(())) => {}
					Ok(Err(error)) => tracing::debug!(?error, "failed to send Disconnect"),
					Err(_) => tracing::debug!("timed out sending Disconnect"),
				},
				Err(error) => tracing::debug!(?error, "failed to encode Disconnect"),
			}
		}

		if let Some(task) = control.reconnect_task.take() {
			task.abort();
		}
		self.cancel_workers(&mut control).await;

		tracing::info!("disconnected");
		self.set_state(ConnectionState::None);
	}

	/// Aborts the connect, read and keep alive workers and waits until each has
	/// been dropped along with its half of the socket.
	async fn cancel_workers(&self, control: &mut Control) {
		control.generation += 1;

		let tasks = [
			control.connect_task.take(),
			control.read_task.take(),
			control.keep_alive_task.take(),
		];
		for task in tasks.into_iter().flatten() {
			task.abort();
			let _ = task.await;
		}

		self.gate.close().await;
	}

	fn reconnect_if_enabled(self: &Arc<Self>, control: &mut Control) {
		let configuration = &control.options.configuration;
		if configuration.reconnect {
			let delay = configuration.reconnect_delay;
			self.schedule_reconnect_locked(control, delay);
		}
	}

	/// Arranges one call to `connect` after `delay`, replacing any reconnect
	/// already pending.
	pub async fn schedule_reconnect(self: &Arc<Self>, delay: Duration) {
		let mut control = self.control.lock().await;
		self.schedule_reconnect_locked(&mut control, delay);
	}

	fn schedule_reconnect_locked(self: &Arc<Self>, control: &mut Control, delay: Duration) {
		if let Some(task) = control.reconnect_task.take() {
			task.abort();
		}
		control.reconnect_seq += 1;
		let seq = control.reconnect_seq;

		tracing::info!(?delay, "reconnect scheduled");
		let engine = Arc::clone(self);
		control.reconnect_task = Some(tokio::spawn(async move {
			time::sleep(delay).await;

			let mut control = engine.control.lock().await;
			if control.reconnect_seq != seq {
				return;
			}
			control.reconnect_task.take();

			tracing::debug!("reconnecting");
			if let Err(error) = engine.connect_locked(&mut control).await {
				tracing::error!(?error, "invalid configuration, not reconnecting");
			}
		}));
	}

	/// Writes `bytes` through the write gate.
	///
	/// A failed write closes the gate and starts connection loss handling.
	pub(crate) async fn write(self: &Arc<Self>, bytes: Bytes) -> Result<(), ClientError> {
		match self.gate.write(&bytes).await {
			Ok(()) => {
				self.clock.touch();
				self.emit(Event::RawPublished(bytes));
				Ok(())
			}
			Err(GateError::Closed) => Err(ClientError::NotConnected),
			Err(GateError::Io { generation, error }) => {
				tracing::error!(?error, "write failed");
				self.spawn_connection_lost(generation);
				Err(ClientError::Transport(error))
			}
		}
	}

	pub(crate) async fn ping(self: &Arc<Self>) -> Result<(), ClientError> {
		tracing::trace!("sending PingReq");
		self.write(packets::PingReq.to_bytes()?).await
	}

	async fn read_worker(
		self: Arc<Self>,
		generation: u64,
		mut reader: PacketReader<ReadHalf<BoxedStream>>,
	) {
		loop {
			match reader.read_message().await {
				Ok(Some(message)) => self.dispatch(message),
				Ok(None) => {
					tracing::info!("connection closed by the server");
					break;
				}
				Err(ReadError::Decode(error)) => {
					tracing::warn!(?error, "discarding malformed packet");
				}
				Err(ReadError::TooLarge { length, limit }) => {
					tracing::warn!(length, limit, "discarding oversized packet");
				}
				Err(ReadError::Io(error)) => {
					tracing::error!(?error, "read failed");
					break;
				}
			}
		}
		self.spawn_connection_lost(generation);
	}

	fn dispatch(&self, message: Message) {
		tracing::debug!(?message, "received");
		match message.packet_type {
			PacketType::PingResp => {
				if let Some(rtt) = self.clock.pong_received() {
					tracing::trace!(?rtt, "PingResp");
				}
			}
			PacketType::ConnAck => match message.variable_header.return_code {
				Some(code) if !code.is_accepted() => {
					tracing::warn!(?code, "connection refused by the server");
				}
				_ => {}
			},
			_ => {}
		}
		self.emit(Event::MessageReceived(message));
	}
}
