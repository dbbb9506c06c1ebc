//! notify-backed change source for the drover worker.
//!
//! Forwards one creation event per new filesystem entry under the watched
//! root into the worker's queue, in the order the platform backend reports
//! them. Everything that is not a creation is filtered out here; the worker
//! only ever sees creations and its own sentinel.

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use drover_core::{ChangeSource, CreationEvent, EventQueue, QueueEntry, WorkerError};
use notify::{
	event::CreateKind, Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tracing::{error, trace};

/// Watches a directory tree with the platform's native notification backend.
///
/// The notify callback runs on the watcher's own thread; enqueueing is
/// non-blocking, so the callback never stalls the backend.
#[derive(Default)]
pub struct FsWatcherSource {
	watcher: Option<RecommendedWatcher>,
	root: Option<PathBuf>,
}

impl FsWatcherSource {
	pub fn new() -> Self {
		Self::default()
	}
}

impl ChangeSource for FsWatcherSource {
	fn attach(&mut self, root: &Path, queue: Arc<EventQueue>) -> Result<(), WorkerError> {
		let mut watcher = RecommendedWatcher::new(
			move |result: notify::Result<Event>| match result {
				Ok(event) => {
					let EventKind::Create(kind) = event.kind else {
						return;
					};

					for path in event.paths {
						let is_directory = match kind {
							CreateKind::Folder => true,
							CreateKind::File => false,
							// Some backends only report a generic creation.
							_ => path.is_dir(),
						};

						trace!(path = %path.display(), is_directory, "Observed creation;");
						queue.enqueue(QueueEntry::Creation(CreationEvent {
							path,
							is_directory,
						}));
					}
				}
				Err(e) => error!(?e, "Watcher error;"),
			},
			Config::default(),
		)?;

		watcher.watch(root, RecursiveMode::Recursive)?;
		trace!(root = %root.display(), "Now watching source directory;");

		self.watcher = Some(watcher);
		self.root = Some(root.to_path_buf());

		Ok(())
	}

	fn detach(&mut self) -> Result<(), WorkerError> {
		if let (Some(mut watcher), Some(root)) = (self.watcher.take(), self.root.take()) {
			// An unwatch failure is not worth failing a shutdown over; the
			// watcher stops emitting once dropped either way.
			if let Err(e) = watcher.unwatch(&root) {
				error!(?e, root = %root.display(), "Unable to unwatch source directory;");
			} else {
				trace!(root = %root.display(), "Stopped watching source directory;");
			}
		}

		Ok(())
	}
}
