//! Drover core: a batching worker that relocates newly created files from a
//! watched source tree into a mirrored destination tree.
//!
//! A [`ChangeSource`] feeds creation events into an [`EventQueue`]; the mover
//! drains the queue in batches bounded by a backlog threshold; a watchdog
//! forces a full flush after an idle timeout. The [`Worker`] facade owns the
//! configuration and the lifecycle of the three background activities.

use std::{io, path::PathBuf};

use thiserror::Error;

pub mod event;
pub mod mover;
pub mod queue;
pub mod source;
pub mod sync;
pub mod watchdog;

mod worker;

pub use event::{CreationEvent, QueueEntry};
pub use queue::EventQueue;
pub use source::ChangeSource;
pub use watchdog::{ActivityTracker, FlushFlag};
pub use worker::Worker;

#[derive(Error, Debug)]
pub enum WorkerError {
	#[error("Tried to reconfigure or start a worker that is already running")]
	AlreadyRunning,
	#[error("No source directory configured")]
	MissingSource,
	#[error("No destination directory configured")]
	MissingDestination,
	#[error("Source directory does not exist: <path='{0:?}'>")]
	SourceNotFound(PathBuf),
	#[error("Source path is not a directory: <path='{0:?}'>")]
	SourceNotADirectory(PathBuf),
	#[error("Watcher error: (error: {0})")]
	Watcher(#[from] notify::Error),
	#[error("Background task panicked: (error: {0})")]
	TaskJoin(#[from] tokio::task::JoinError),
	#[error("I/O error: {source}; path: '{path:?}'")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}
