use mqtt_protocol::PacketId;
use std::sync::atomic::{AtomicU16, Ordering};

/// Allocates message ids for Publish, Subscribe and Unsubscribe packets.
///
/// Ids start at 0 and wrap from 65535 back to 0. The counter is not reset
/// between connections.
#[derive(Debug, Default)]
pub struct MessageIdCounter {
	next: AtomicU16,
}

impl MessageIdCounter {
	pub const fn new() -> Self {
		Self {
			next: AtomicU16::new(0),
		}
	}

	/// Returns the next id. Safe to call from any number of tasks.
	#[inline]
	pub fn allocate(&self) -> PacketId {
		self.next.fetch_add(1, Ordering::Relaxed)
	}
}
