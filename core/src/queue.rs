use crate::event::QueueEntry;

use std::{collections::VecDeque, sync::Mutex};

use tokio::sync::Notify;

/// FIFO queue between the change source and the mover.
///
/// `enqueue` must stay callable from non-async contexts, as the watcher
/// callback runs on notify's own thread. The mover parks on [`Self::notified`]
/// instead of polling an empty queue.
#[derive(Debug, Default)]
pub struct EventQueue {
	entries: Mutex<VecDeque<QueueEntry>>,
	wake: Notify,
}

impl EventQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends to the tail and wakes a parked consumer. Never blocks, never
	/// drops.
	pub fn enqueue(&self, entry: QueueEntry) {
		self.entries
			.lock()
			.expect("event queue mutex poisoned")
			.push_back(entry);
		self.wake.notify_one();
	}

	/// Atomically removes and returns up to `max_n` entries in insertion
	/// order. Returns fewer, or none, if the queue currently holds fewer;
	/// never waits for more to arrive.
	pub fn dequeue_batch(&self, max_n: usize) -> Vec<QueueEntry> {
		let mut entries = self.entries.lock().expect("event queue mutex poisoned");
		let n = max_n.min(entries.len());
		entries.drain(..n).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().expect("event queue mutex poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Resolves once an entry has been enqueued since the last wait. A permit
	/// is stored if the enqueue happened first, so the wakeup cannot be lost.
	pub async fn notified(&self) {
		self.wake.notified().await;
	}
}
