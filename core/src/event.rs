use std::path::PathBuf;

/// A single creation observed under the source root, either live from the
/// change source or synthesized by the initial sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationEvent {
	pub path: PathBuf,
	pub is_directory: bool,
}

impl CreationEvent {
	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			is_directory: false,
		}
	}

	pub fn directory(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			is_directory: true,
		}
	}
}

/// What actually travels through the queue: real creations plus the shutdown
/// sentinel that tells the mover to finish its current drain and exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEntry {
	Creation(CreationEvent),
	Shutdown,
}
