use crate::event::CreationEvent;

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Scans a pre-existing source tree and synthesizes creation events for it,
/// parents strictly before their children, so the mover handles historical
/// content through the same path as live events.
///
/// A tree holding no files at all yields nothing: live monitoring will pick
/// up future creations, and bare directories get materialized on demand
/// through the normal event path.
pub fn scan_existing(source: &Path) -> Vec<CreationEvent> {
	let mut events = Vec::new();
	let mut any_file = false;

	for entry in WalkDir::new(source).min_depth(1) {
		let entry = match entry {
			Ok(entry) => entry,
			Err(e) => {
				warn!(?e, "Unable to read entry during initial sync, skipping;");
				continue;
			}
		};

		let is_directory = entry.file_type().is_dir();
		any_file |= !is_directory;
		events.push(CreationEvent {
			path: entry.into_path(),
			is_directory,
		});
	}

	if !any_file {
		return Vec::new();
	}

	debug!(
		count = events.len(),
		"Initial sync found pre-existing entries to relocate;"
	);
	events
}
