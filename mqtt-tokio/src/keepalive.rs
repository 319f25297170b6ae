use crate::engine::Engine;
use mqtt_client::ConnectionState;
use std::{
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};
use tokio::time::{self, Instant};

/// How often the monitor checks the clock.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long past the keep alive interval a PingResp may take to arrive.
pub(crate) const PING_GRACE: Duration = Duration::from_millis(2000);

/// Timestamps shared by the write gate, the read worker and the monitor.
///
/// Values are stored as milliseconds since `epoch`. Readers may see a value
/// up to one poll interval old.
#[derive(Debug)]
pub(crate) struct KeepAliveClock {
	epoch: Instant,
	last_action: AtomicU64,
	ping_pending: AtomicBool,
	ping_sent_at: AtomicU64,
}

impl KeepAliveClock {
	pub fn new() -> Self {
		Self {
			epoch: Instant::now(),
			last_action: AtomicU64::new(0),
			ping_pending: AtomicBool::new(false),
			ping_sent_at: AtomicU64::new(0),
		}
	}

	fn now(&self) -> u64 {
		self.epoch.elapsed().as_millis() as u64
	}

	/// Records a successful write.
	pub fn touch(&self) {
		self.last_action.store(self.now(), Ordering::Release);
	}

	/// Time since the last successful write.
	pub fn idle(&self) -> Duration {
		let last = self.last_action.load(Ordering::Acquire);
		Duration::from_millis(self.now().saturating_sub(last))
	}

	pub fn ping_sent(&self) {
		self.ping_sent_at.store(self.now(), Ordering::Release);
		self.ping_pending.store(true, Ordering::Release);
	}

	pub fn ping_pending(&self) -> bool {
		self.ping_pending.load(Ordering::Acquire)
	}

	/// Clears the pending flag and returns the round trip time of the ping,
	/// if one was outstanding.
	pub fn pong_received(&self) -> Option<Duration> {
		if !self.ping_pending.swap(false, Ordering::AcqRel) {
			return None;
		}
		let sent = self.ping_sent_at.load(Ordering::Acquire);
		Some(Duration::from_millis(self.now().saturating_sub(sent)))
	}

	/// Starts a new connection with a fresh clock.
	pub fn reset(&self) {
		self.ping_pending.store(false, Ordering::Release);
		self.touch();
	}
}

/// Sends PingReq when the connection has been idle for `interval` and escalates
/// an unanswered ping to a lost connection.
///
/// The deadline runs from the last write that completed, so a ping stuck
/// behind a stalled write is escalated like one the server never answered.
pub(crate) async fn monitor(engine: Arc<Engine>, generation: u64, interval: Duration) {
	tracing::debug!(?interval, "keep alive monitor started");
	loop {
		time::sleep(POLL_INTERVAL).await;

		match engine.state() {
			ConnectionState::Connected => {}
			// Workers start just before Connected is reported.
			ConnectionState::Connecting => continue,
			ConnectionState::None | ConnectionState::ConnectionFailed => break,
		}

		let idle = engine.clock.idle();
		if engine.clock.ping_pending() {
			if idle > interval + PING_GRACE {
				tracing::warn!(?idle, "no PingResp within the keep alive grace period");
				engine.spawn_connection_lost(generation);
				break;
			}
		} else if idle >= interval {
			// The write may wait behind a stalled publish, so the deadline is
			// checked while it is pending.
			engine.clock.ping_sent();
			let engine = Arc::clone(&engine);
			tokio::spawn(async move {
				if let Err(error) = engine.ping().await {
					tracing::debug!(?error, "failed to send PingReq");
				}
			});
		}
	}
	tracing::debug!("keep alive monitor stopped");
}
