use mqtt_client::{ClientConfiguration, ClientOptions, ConnectionState, Event, TcpConfiguration};
use mqtt_protocol::{PacketType, QoS, ValidationError};
use mqttlink_tokio::{
	create_client_with_connector, BoxedStream, Client, ClientError, ConnectFuture, Connector,
	EventRx,
};
use std::{
	io,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
		Arc,
	},
	task::{Context, Poll},
	time::Duration,
};
use tokio::{
	io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf},
	sync::mpsc,
	time::{self, Instant},
};

const CONNECT_CLIENT1: [u8; 21] = [
	0x10, 19, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 10, 0x00, 0x07, b'c', b'l',
	b'i', b'e', b'n', b't', b'1',
];

/// Shared counters for the sockets handed out by a [`TestConnector`].
#[derive(Clone, Default)]
struct Sockets {
	open: Arc<AtomicUsize>,
	max_open: Arc<AtomicUsize>,
	opened: Arc<AtomicUsize>,
	fail_writes: Arc<AtomicBool>,
}

impl Sockets {
	fn open(&self) -> usize {
		self.open.load(SeqCst)
	}

	fn max_open(&self) -> usize {
		self.max_open.load(SeqCst)
	}

	fn opened(&self) -> usize {
		self.opened.load(SeqCst)
	}

	fn fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, SeqCst);
	}
}

/// Hands out in-memory streams and passes the far end of each to the test.
struct TestConnector {
	sockets: Sockets,
	servers: mpsc::UnboundedSender<DuplexStream>,
	refuse: bool,
}

impl Connector for TestConnector {
	fn connect<'a>(&'a self, _: &'a TcpConfiguration) -> ConnectFuture<'a> {
		Box::pin(async move {
			if self.refuse {
				return Err(io::ErrorKind::ConnectionRefused.into());
			}

			let (client, server) = duplex(64 * 1024);
			let _ = self.servers.send(server);
			Ok(Box::new(CountedStream::new(client, self.sockets.clone())) as BoxedStream)
		})
	}
}

struct CountedStream {
	inner: DuplexStream,
	sockets: Sockets,
}

impl CountedStream {
	fn new(inner: DuplexStream, sockets: Sockets) -> Self {
		let open = sockets.open.fetch_add(1, SeqCst) + 1;
		sockets.max_open.fetch_max(open, SeqCst);
		sockets.opened.fetch_add(1, SeqCst);
		Self { inner, sockets }
	}
}

impl Drop for CountedStream {
	fn drop(&mut self) {
		self.sockets.open.fetch_sub(1, SeqCst);
	}
}

impl AsyncRead for CountedStream {
	fn poll_read(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}

impl AsyncWrite for CountedStream {
	fn poll_write(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		if self.sockets.fail_writes.load(SeqCst) {
			return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
		}
		Pin::new(&mut self.inner).poll_write(cx, buf)
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_flush(cx)
	}

	fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_shutdown(cx)
	}
}

struct Harness {
	client: Client,
	events: EventRx,
	servers: mpsc::UnboundedReceiver<DuplexStream>,
	sockets: Sockets,
}

fn harness(options: ClientOptions) -> Harness {
	harness_with(options, false)
}

fn harness_with(options: ClientOptions, refuse: bool) -> Harness {
	let sockets = Sockets::default();
	let (servers_tx, servers) = mpsc::unbounded_channel();
	let connector = TestConnector {
		sockets: sockets.clone(),
		servers: servers_tx,
		refuse,
	};
	let (client, events) = create_client_with_connector(options, connector);
	Harness {
		client,
		events,
		servers,
		sockets,
	}
}

fn options(client_id: &str) -> ClientOptions {
	ClientConfiguration::new(client_id).into_options(TcpConfiguration::default())
}

async fn next_event(events: &mut EventRx) -> Event {
	time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("timed out waiting for an event")
		.expect("event channel closed")
}

/// Skips events until the next state change.
async fn next_state(events: &mut EventRx) -> ConnectionState {
	loop {
		if let Event::StateChanged(state) = next_event(events).await {
			return state;
		}
	}
}

/// Skips events until the next received packet.
async fn next_message(events: &mut EventRx) -> mqtt_protocol::Message {
	loop {
		if let Event::MessageReceived(message) = next_event(events).await {
			return message;
		}
	}
}

async fn expect_bytes(server: &mut DuplexStream, expected: &[u8]) {
	let mut buffer = vec![0; expected.len()];
	server.read_exact(&mut buffer).await.unwrap();
	assert_eq!(buffer, expected);
}

/// Connects and returns the server side of the connection, with the Connect
/// packet already consumed.
async fn connect(harness: &mut Harness, connect_packet: &[u8]) -> DuplexStream {
	harness.client.connect().await.unwrap();
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connecting);
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connected);

	let mut server = harness.servers.recv().await.unwrap();
	expect_bytes(&mut server, connect_packet).await;
	server
}

#[tokio::test]
async fn connect_sends_connect_then_reports_connected() {
	let mut harness = harness(options("client1"));
	assert_eq!(harness.client.state(), ConnectionState::None);

	harness.client.connect().await.unwrap();
	assert_eq!(next_event(&mut harness.events).await, Event::StateChanged(ConnectionState::Connecting));
	assert_eq!(
		next_event(&mut harness.events).await,
		Event::RawPublished(CONNECT_CLIENT1.to_vec().into())
	);
	assert_eq!(next_event(&mut harness.events).await, Event::StateChanged(ConnectionState::Connected));
	assert_eq!(harness.client.state(), ConnectionState::Connected);

	let mut server = harness.servers.recv().await.unwrap();
	expect_bytes(&mut server, &CONNECT_CLIENT1).await;
	assert_eq!(harness.sockets.open(), 1);
}

#[tokio::test]
async fn invalid_client_id_is_rejected_before_any_io() {
	for client_id in [String::new(), "x".repeat(65536)] {
		let mut harness = harness(options(&client_id));

		let result = harness.client.connect().await;
		assert!(matches!(result, Err(ClientError::Validation(_))), "{result:?}");
		assert_eq!(harness.client.state(), ConnectionState::None);
		assert!(harness.events.try_recv().is_err());
		assert!(harness.servers.try_recv().is_err());
		assert_eq!(harness.sockets.opened(), 0);
	}
}

#[tokio::test]
async fn packets_are_written_with_allocated_ids() {
	let mut harness = harness(options("client1"));

	// Not connected: the id is still consumed.
	assert!(matches!(
		harness.client.publish("a/b", "x", false).await,
		Err(ClientError::NotConnected)
	));

	let mut server = connect(&mut harness, &CONNECT_CLIENT1).await;

	assert_eq!(harness.client.publish("a/b", "hi", false).await.unwrap(), 1);
	expect_bytes(&mut server, &[0x30, 7, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']).await;

	assert_eq!(harness.client.subscribe("a/#", QoS::AtLeastOnce).await.unwrap(), 2);
	expect_bytes(&mut server, &[0x82, 8, 0x00, 0x02, 0x00, 0x03, b'a', b'/', b'#', 0x01]).await;

	let id = harness
		.client
		.subscribe_many(&["a", "b"], &[QoS::AtMostOnce, QoS::ExactlyOnce])
		.await
		.unwrap();
	assert_eq!(id, 3);
	expect_bytes(
		&mut server,
		&[0x82, 10, 0x00, 0x03, 0x00, 0x01, b'a', 0x00, 0x00, 0x01, b'b', 0x02],
	)
	.await;

	assert_eq!(harness.client.unsubscribe("a").await.unwrap(), 4);
	expect_bytes(&mut server, &[0xa2, 5, 0x00, 0x04, 0x00, 0x01, b'a']).await;

	let id = harness
		.client
		.publish_with_qos("t", "p", QoS::AtLeastOnce, true)
		.await
		.unwrap();
	assert_eq!(id, 5);
	expect_bytes(&mut server, &[0x33, 6, 0x00, 0x01, b't', 0x00, 0x05, b'p']).await;

	assert!(matches!(
		harness.client.subscribe_many(&["a", "b"], &[QoS::AtMostOnce]).await,
		Err(ClientError::Validation(ValidationError::MismatchedQoS { topics: 2, qos: 1 }))
	));
}

#[tokio::test]
async fn every_write_is_reported() {
	let mut harness = harness(options("client1"));
	let _server = connect(&mut harness, &CONNECT_CLIENT1).await;

	harness.client.publish("a/b", "hi", false).await.unwrap();
	assert_eq!(
		next_event(&mut harness.events).await,
		Event::RawPublished(vec![0x30, 7, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'].into())
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconnect_while_connected_keeps_a_single_socket() {
	let mut harness = harness(options("client1"));
	let mut servers = Vec::new();
	servers.push(connect(&mut harness, &CONNECT_CLIENT1).await);

	for _ in 0..5 {
		servers.push(connect(&mut harness, &CONNECT_CLIENT1).await);
		assert_eq!(harness.sockets.open(), 1);
	}

	let client = &harness.client;
	let _ = tokio::join!(client.connect(), client.connect(), client.connect());

	let mut state = client.watch_state();
	time::timeout(Duration::from_secs(5), state.wait_for(|state| state.is_connected()))
		.await
		.unwrap()
		.unwrap();

	assert_eq!(harness.sockets.open(), 1);
	assert_eq!(harness.sockets.max_open(), 1);
	// Superseded attempts may be cancelled before opening a socket.
	assert!(harness.sockets.opened() >= 7);
}

#[tokio::test]
async fn write_failure_drops_to_none_and_reconnects() {
	let mut options = options("client1");
	options.configuration.reconnect = true;
	options.configuration.reconnect_delay = Duration::from_millis(200);

	let mut harness = harness(options);
	let _server = connect(&mut harness, &CONNECT_CLIENT1).await;

	harness.sockets.fail_writes(true);
	let failed_at = Instant::now();
	assert!(matches!(
		harness.client.publish("a/b", "hi", false).await,
		Err(ClientError::Transport(_))
	));
	harness.sockets.fail_writes(false);

	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connecting);
	assert!(failed_at.elapsed() >= Duration::from_millis(200));
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connected);

	let mut server = harness.servers.recv().await.unwrap();
	expect_bytes(&mut server, &CONNECT_CLIENT1).await;
	assert_eq!(harness.sockets.opened(), 2);
	assert_eq!(harness.sockets.max_open(), 1);
}

#[tokio::test]
async fn write_failure_without_reconnect_stays_down() {
	let mut harness = harness(options("client1"));
	let _server = connect(&mut harness, &CONNECT_CLIENT1).await;

	harness.sockets.fail_writes(true);
	assert!(harness.client.publish("a/b", "hi", false).await.is_err());

	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert!(time::timeout(Duration::from_millis(300), harness.events.recv())
		.await
		.is_err());
	assert_eq!(harness.sockets.open(), 0);
}

#[tokio::test]
async fn server_closing_the_stream_is_connection_lost() {
	let mut harness = harness(options("client1"));
	let server = connect(&mut harness, &CONNECT_CLIENT1).await;

	drop(server);
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert!(matches!(
		harness.client.publish("a/b", "hi", false).await,
		Err(ClientError::NotConnected)
	));
}

#[tokio::test]
async fn failed_attempts_are_retried_until_disconnect() {
	let mut options = options("client1");
	options.configuration.reconnect = true;
	options.configuration.reconnect_delay = Duration::from_millis(50);

	let mut harness = harness_with(options, true);
	harness.client.connect().await.unwrap();
	for _ in 0..2 {
		assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connecting);
		assert_eq!(
			next_state(&mut harness.events).await,
			ConnectionState::ConnectionFailed
		);
	}

	harness.client.disconnect().await;
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert!(time::timeout(Duration::from_millis(200), harness.events.recv())
		.await
		.is_err());
}

#[tokio::test]
async fn explicit_reconnect_ignores_the_reconnect_flag() {
	let mut harness = harness(options("client1"));
	let _server = connect(&mut harness, &CONNECT_CLIENT1).await;

	harness.client.disconnect().await;
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);

	harness.client.schedule_reconnect(Duration::from_millis(50)).await;
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connecting);
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::Connected);
}

#[tokio::test]
async fn disconnect_sends_disconnect_and_closes_the_socket() {
	let mut harness = harness(options("client1"));
	let mut server = connect(&mut harness, &CONNECT_CLIENT1).await;

	harness.client.disconnect().await;
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	expect_bytes(&mut server, &[0xe0, 0x00]).await;

	let mut buffer = [0; 8];
	assert_eq!(server.read(&mut buffer).await.unwrap(), 0);
	assert_eq!(harness.sockets.open(), 0);

	// Disconnecting again still reports the state.
	harness.client.disconnect().await;
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
}

#[tokio::test]
async fn inbound_packets_are_forwarded() {
	let mut harness = harness(options("client1"));
	let mut server = connect(&mut harness, &CONNECT_CLIENT1).await;

	server.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
	let connack = next_message(&mut harness.events).await;
	assert_eq!(connack.packet_type, PacketType::ConnAck);

	// A Publish split across writes.
	server.write_all(&[0x30, 0x07, 0x00]).await.unwrap();
	time::sleep(Duration::from_millis(20)).await;
	server
		.write_all(&[0x03, b'a', b'/', b'b', b'h', b'i'])
		.await
		.unwrap();

	let publish = next_message(&mut harness.events).await;
	assert_eq!(publish.topic(), Some("a/b"));
	assert_eq!(&publish.payload[..], b"hi");
}

#[tokio::test]
async fn malformed_packet_keeps_the_reader_alive() {
	let mut harness = harness(options("client1"));
	let mut server = connect(&mut harness, &CONNECT_CLIENT1).await;

	server
		.write_all(&[0x30, 0xff, 0xff, 0xff, 0xff, 0x01])
		.await
		.unwrap();
	time::sleep(Duration::from_millis(50)).await;
	server
		.write_all(&[0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'])
		.await
		.unwrap();

	let publish = next_message(&mut harness.events).await;
	assert_eq!(publish.topic(), Some("a/b"));
	assert_eq!(harness.client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn oversized_declared_length_is_not_buffered() {
	let mut options = options("client1");
	options.configuration.max_packet_size = Some(64);
	let mut harness = harness(options);
	let mut server = connect(&mut harness, &CONNECT_CLIENT1).await;

	// Declares 268435455 bytes but only the start ever arrives.
	server.write_all(&[0x30, 0xff, 0xff, 0xff, 0x7f, 0x00, 0x03]).await.unwrap();
	time::sleep(Duration::from_millis(50)).await;
	assert_eq!(harness.client.state(), ConnectionState::Connected);
	assert!(harness.events.try_recv().is_err());
}

#[tokio::test]
async fn packet_over_the_limit_is_skipped() {
	let mut options = options("client1");
	options.configuration.max_packet_size = Some(8);
	let mut harness = harness(options);
	let mut server = connect(&mut harness, &CONNECT_CLIENT1).await;

	server
		.write_all(&[0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'])
		.await
		.unwrap();
	server.write_all(&[0xd0, 0x00]).await.unwrap();

	let message = next_message(&mut harness.events).await;
	assert_eq!(message.packet_type, PacketType::PingResp);
	assert_eq!(harness.client.state(), ConnectionState::Connected);
}

fn keep_alive_options(seconds: u16) -> ClientOptions {
	let mut options = options("client1");
	options.configuration.keep_alive = seconds;
	options
}

const CONNECT_KEEP_ALIVE_1: [u8; 21] = [
	0x10, 19, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 1, 0x00, 0x07, b'c', b'l',
	b'i', b'e', b'n', b't', b'1',
];

#[tokio::test(start_paused = true)]
async fn idle_connection_is_pinged() {
	let mut harness = harness(keep_alive_options(1));
	let mut server = connect(&mut harness, &CONNECT_KEEP_ALIVE_1).await;

	let started = Instant::now();
	expect_bytes(&mut server, &[0xc0, 0x00]).await;
	assert!(started.elapsed() >= Duration::from_secs(1));

	// Answering clears the pending ping, so another is sent once idle again.
	server.write_all(&[0xd0, 0x00]).await.unwrap();
	assert_eq!(
		next_message(&mut harness.events).await.packet_type,
		PacketType::PingResp
	);
	expect_bytes(&mut server, &[0xc0, 0x00]).await;
	assert_eq!(harness.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn unanswered_ping_is_connection_lost() {
	let mut harness = harness(keep_alive_options(1));
	let mut server = connect(&mut harness, &CONNECT_KEEP_ALIVE_1).await;

	expect_bytes(&mut server, &[0xc0, 0x00]).await;
	let pinged_at = Instant::now();

	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert!(pinged_at.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn zero_keep_alive_never_pings() {
	let mut harness = harness(keep_alive_options(0));
	let mut connect_packet = CONNECT_KEEP_ALIVE_1;
	connect_packet[11] = 0;
	let mut server = connect(&mut harness, &connect_packet).await;

	let mut buffer = [0; 2];
	assert!(
		time::timeout(Duration::from_secs(30), server.read(&mut buffer))
			.await
			.is_err()
	);
	assert_eq!(harness.client.state(), ConnectionState::Connected);
}

/// Starts a publish larger than the in-memory socket buffer, against a server
/// that never reads, and waits until it is stuck.
async fn stalled_publish(harness: &Harness) -> tokio::task::JoinHandle<Result<u16, ClientError>> {
	let client = harness.client.clone();
	let publish =
		tokio::spawn(async move { client.publish("a/b", vec![0; 256 * 1024], false).await });
	time::sleep(Duration::from_millis(100)).await;
	assert!(!publish.is_finished());
	publish
}

#[tokio::test(start_paused = true)]
async fn stalled_write_does_not_hold_off_the_keep_alive_timeout() {
	let mut harness = harness(keep_alive_options(1));
	let _server = connect(&mut harness, &CONNECT_KEEP_ALIVE_1).await;
	let connected_at = Instant::now();

	let publish = stalled_publish(&harness).await;

	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert!(connected_at.elapsed() >= Duration::from_secs(3));
	assert!(connected_at.elapsed() < Duration::from_secs(5));
	assert!(matches!(publish.await.unwrap(), Err(ClientError::NotConnected)));
	assert_eq!(harness.sockets.open(), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_does_not_wait_for_a_stalled_write() {
	let mut harness = harness(keep_alive_options(0));
	let mut connect_packet = CONNECT_KEEP_ALIVE_1;
	connect_packet[11] = 0;
	let _server = connect(&mut harness, &connect_packet).await;

	let publish = stalled_publish(&harness).await;

	time::timeout(Duration::from_secs(3), harness.client.disconnect())
		.await
		.expect("disconnect waited for the stalled write");
	assert_eq!(next_state(&mut harness.events).await, ConnectionState::None);
	assert!(matches!(publish.await.unwrap(), Err(ClientError::NotConnected)));
	assert_eq!(harness.sockets.open(), 0);
}

#[tokio::test(start_paused = true)]
async fn connect_replaces_a_stalled_connection() {
	let mut harness = harness(keep_alive_options(0));
	let mut connect_packet = CONNECT_KEEP_ALIVE_1;
	connect_packet[11] = 0;
	let _stalled = connect(&mut harness, &connect_packet).await;

	let publish = stalled_publish(&harness).await;

	let mut server = time::timeout(Duration::from_secs(3), connect(&mut harness, &connect_packet))
		.await
		.expect("connect waited for the stalled write");
	assert!(matches!(publish.await.unwrap(), Err(ClientError::NotConnected)));
	assert_eq!(harness.sockets.open(), 1);
	assert_eq!(harness.sockets.max_open(), 1);

	harness.client.publish("a/b", "hi", false).await.unwrap();
	expect_bytes(&mut server, &[0x30, 7, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']).await;
}
