use crate::{queue::EventQueue, WorkerError};

use std::{path::Path, sync::Arc};

/// The external change observer feeding the worker.
///
/// An attached source emits one [`CreationEvent`](crate::CreationEvent) per
/// entry created under the watched root, recursively, in the order observed,
/// until detached. Failures of the underlying notification mechanism after a
/// successful attach are the source's to report; the worker does not restart
/// a dead observer.
pub trait ChangeSource: Send {
	/// Begin emitting creation events for everything created under `root`
	/// into `queue`.
	fn attach(&mut self, root: &Path, queue: Arc<EventQueue>) -> Result<(), WorkerError>;

	/// Stop emitting events. Must be safe to call when not attached.
	fn detach(&mut self) -> Result<(), WorkerError>;
}
