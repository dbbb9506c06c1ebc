use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_channel as chan;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Level-triggered flush request shared between the watchdog and the mover.
///
/// Carries no payload, so a single atomic is the whole synchronization story:
/// the watchdog raises it, the mover consumes it with an atomic test-and-clear.
#[derive(Debug, Default)]
pub struct FlushFlag(AtomicBool);

impl FlushFlag {
	pub fn raise(&self) {
		self.0.store(true, Ordering::Release);
	}

	/// Atomic test-and-clear.
	pub fn take(&self) -> bool {
		self.0.swap(false, Ordering::AcqRel)
	}
}

/// Timestamp of the last processed batch, shared between the mover and the
/// watchdog.
#[derive(Debug)]
pub struct ActivityTracker(Mutex<Instant>);

impl ActivityTracker {
	pub fn new() -> Self {
		Self(Mutex::new(Instant::now()))
	}

	pub fn touch(&self) {
		*self.0.lock().expect("activity tracker mutex poisoned") = Instant::now();
	}

	pub fn idle_for(&self) -> Duration {
		self.0
			.lock()
			.expect("activity tracker mutex poisoned")
			.elapsed()
	}
}

impl Default for ActivityTracker {
	fn default() -> Self {
		Self::new()
	}
}

/// Requests a full queue flush whenever no batch has been processed for longer
/// than `timeout`, then re-arms so it only fires again after another full idle
/// period. A zero `timeout` disables idle flushing entirely.
pub async fn run(
	timeout: Duration,
	activity: Arc<ActivityTracker>,
	flush: Arc<FlushFlag>,
	stop_rx: chan::Receiver<()>,
) {
	let mut tick = interval_at(Instant::now() + ONE_SECOND, ONE_SECOND);
	tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = tick.tick() => {
				if !timeout.is_zero() && activity.idle_for() > timeout {
					debug!(?timeout, "Source has been idle for too long, requesting flush;");
					flush.raise();
					activity.touch();
				}
			}
			_ = stop_rx.recv() => {
				trace!("Watchdog received shutdown signal and will exit...");
				break;
			}
		}
	}
}
