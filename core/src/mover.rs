use crate::{
	event::{CreationEvent, QueueEntry},
	queue::EventQueue,
	watchdog::{ActivityTracker, FlushFlag},
};

use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use tokio::{fs, time::sleep};
use tracing::{debug, error, trace, warn};

const HUNDRED_MILLIS: Duration = Duration::from_millis(100);

/// Drains the queue in backlog-bounded batches and applies each creation to
/// the destination tree.
///
/// While more than `threshold` entries are pending, the oldest surplus is
/// processed; a raised flush flag overrides the threshold and drains
/// everything. The loop exits only after popping the shutdown sentinel, and
/// still processes every real entry of that final batch first.
pub async fn run(
	source: PathBuf,
	destination: PathBuf,
	threshold: usize,
	queue: Arc<EventQueue>,
	flush: Arc<FlushFlag>,
	activity: Arc<ActivityTracker>,
) {
	loop {
		let forced = flush.take();
		let backlog = queue.len();
		let n = if forced {
			backlog
		} else {
			backlog.saturating_sub(threshold)
		};

		if n == 0 {
			// Park until a new entry arrives, re-checking at watchdog
			// granularity so a raised flush flag is picked up promptly.
			tokio::select! {
				() = queue.notified() => {},
				() = sleep(HUNDRED_MILLIS) => {},
			}
			continue;
		}

		if forced {
			debug!(count = n, "Flushing entire backlog;");
		}

		activity.touch();

		let mut shutdown = false;
		for entry in queue.dequeue_batch(n) {
			match entry {
				QueueEntry::Creation(event) => {
					apply_event(event, &source, &destination, &queue).await;
				}
				QueueEntry::Shutdown => shutdown = true,
			}
		}

		if shutdown {
			trace!("Mover received shutdown sentinel and will exit...");
			break;
		}
	}
}

/// Applies a single creation to the destination tree. Failures never escape:
/// transient ones are logged and either dropped or re-enqueued for retry.
async fn apply_event(
	event: CreationEvent,
	source: &Path,
	destination: &Path,
	queue: &EventQueue,
) {
	let Some(dst_path) = rebase(&event.path, source, destination) else {
		warn!(
			path = %event.path.display(),
			"Observed entry outside the source root, dropping;"
		);
		return;
	};

	if event.is_directory {
		trace!(path = %dst_path.display(), "mkdir;");

		if let Err(e) = fs::create_dir(&dst_path).await {
			if e.kind() == ErrorKind::AlreadyExists {
				warn!(path = %dst_path.display(), "Destination directory already exists;");
			} else {
				error!(?e, path = %dst_path.display(), "Unable to create destination directory;");
			}
		}
	} else {
		trace!(from = %event.path.display(), to = %dst_path.display(), "mv;");

		if let Err(e) = fs::rename(&event.path, &dst_path).await {
			match e.kind() {
				ErrorKind::NotFound => warn!(
					path = %event.path.display(),
					"File vanished before it could be moved, skipping;"
				),
				ErrorKind::PermissionDenied => {
					error!(
						?e,
						path = %event.path.display(),
						"File is locked or inaccessible, re-enqueueing for a later retry;"
					);
					queue.enqueue(QueueEntry::Creation(event));
				}
				_ => error!(
					?e,
					path = %event.path.display(),
					"Unexpected error while moving file;"
				),
			}
		}
	}
}

/// Re-roots a source path onto the destination directory, preserving the
/// relative path under the source root.
fn rebase(path: &Path, source: &Path, destination: &Path) -> Option<PathBuf> {
	path.strip_prefix(source)
		.ok()
		.map(|relative| destination.join(relative))
}
