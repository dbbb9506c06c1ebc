use crate::{
	event::QueueEntry,
	mover,
	queue::EventQueue,
	source::ChangeSource,
	sync,
	watchdog::{self, ActivityTracker, FlushFlag},
	WorkerError,
};

use std::{
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use async_channel as chan;
use tokio::{fs, spawn, task::JoinHandle};
use tracing::{info, instrument};

const DEFAULT_THRESHOLD: usize = 10;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Background activities of a single running session. The queue and flush
/// flag are recreated on every start, so a stale producer can never feed a
/// fresh session.
struct Activities {
	queue: Arc<EventQueue>,
	flush: Arc<FlushFlag>,
	mover_handle: JoinHandle<()>,
	watchdog_handle: JoinHandle<()>,
	watchdog_stop_tx: chan::Sender<()>,
}

/// Lifecycle controller: owns the configuration and the mover, watchdog and
/// change-source activities.
///
/// Configuration is only mutable while stopped; setters on a running worker
/// return [`WorkerError::AlreadyRunning`] instead of silently restarting.
pub struct Worker<S> {
	source_path: Option<PathBuf>,
	destination_path: Option<PathBuf>,
	threshold: usize,
	timeout: Duration,
	change_source: S,
	running: Option<Activities>,
}

impl<S: ChangeSource> Worker<S> {
	pub fn new(change_source: S) -> Self {
		Self {
			source_path: None,
			destination_path: None,
			threshold: DEFAULT_THRESHOLD,
			timeout: DEFAULT_TIMEOUT,
			change_source,
			running: None,
		}
	}

	pub fn is_running(&self) -> bool {
		self.running.is_some()
	}

	/// The source must exist and be a readable directory before it is
	/// accepted.
	pub fn set_source(&mut self, path: impl AsRef<Path>) -> Result<(), WorkerError> {
		self.ensure_stopped()?;

		let path = path.as_ref();
		if !path.exists() {
			return Err(WorkerError::SourceNotFound(path.to_path_buf()));
		}
		if !path.is_dir() {
			return Err(WorkerError::SourceNotADirectory(path.to_path_buf()));
		}

		info!(path = %path.display(), "Updating source directory;");
		self.source_path = Some(path.to_path_buf());

		Ok(())
	}

	/// The destination is created on start if absent.
	pub fn set_destination(&mut self, path: impl AsRef<Path>) -> Result<(), WorkerError> {
		self.ensure_stopped()?;

		info!(path = %path.as_ref().display(), "Updating destination directory;");
		self.destination_path = Some(path.as_ref().to_path_buf());

		Ok(())
	}

	/// Minimum backlog depth below which the mover defers moving the oldest
	/// entries. Zero means "move immediately, no batching".
	pub fn set_threshold(&mut self, threshold: usize) -> Result<(), WorkerError> {
		self.ensure_stopped()?;
		self.threshold = threshold;
		Ok(())
	}

	/// Idle period after which the watchdog forces a full flush. Zero
	/// disables idle flushing.
	pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), WorkerError> {
		self.ensure_stopped()?;
		self.timeout = timeout;
		Ok(())
	}

	fn ensure_stopped(&self) -> Result<(), WorkerError> {
		if self.is_running() {
			Err(WorkerError::AlreadyRunning)
		} else {
			Ok(())
		}
	}

	/// Reconciles pre-existing source content, attaches the change source and
	/// launches the mover and watchdog loops.
	#[instrument(
		skip(self),
		fields(source = ?self.source_path, destination = ?self.destination_path),
	)]
	pub async fn start(&mut self) -> Result<(), WorkerError> {
		self.ensure_stopped()?;

		let source = self
			.source_path
			.clone()
			.ok_or(WorkerError::MissingSource)?;
		let destination = self
			.destination_path
			.clone()
			.ok_or(WorkerError::MissingDestination)?;

		// The source may have vanished since it was configured.
		if !source.is_dir() {
			return Err(WorkerError::SourceNotFound(source));
		}

		fs::create_dir_all(&destination)
			.await
			.map_err(|e| WorkerError::Io {
				path: destination.clone(),
				source: e,
			})?;

		let queue = Arc::new(EventQueue::new());
		let flush = Arc::new(FlushFlag::default());
		let activity = Arc::new(ActivityTracker::new());

		// Pre-existing content goes through the same mover path as live
		// events, ahead of anything the change source will observe.
		for event in sync::scan_existing(&source) {
			queue.enqueue(QueueEntry::Creation(event));
		}

		self.change_source.attach(&source, Arc::clone(&queue))?;

		let mover_handle = spawn(mover::run(
			source,
			destination,
			self.threshold,
			Arc::clone(&queue),
			Arc::clone(&flush),
			Arc::clone(&activity),
		));

		let (watchdog_stop_tx, watchdog_stop_rx) = chan::bounded(1);
		let watchdog_handle = spawn(watchdog::run(
			self.timeout,
			activity,
			Arc::clone(&flush),
			watchdog_stop_rx,
		));

		self.running = Some(Activities {
			queue,
			flush,
			mover_handle,
			watchdog_handle,
			watchdog_stop_tx,
		});

		info!("Worker started");

		Ok(())
	}

	/// Drains the queue and joins every background activity. Idempotent, and
	/// a no-op while stopped.
	#[instrument(skip(self))]
	pub async fn stop(&mut self) -> Result<(), WorkerError> {
		let Some(Activities {
			queue,
			flush,
			mover_handle,
			watchdog_handle,
			watchdog_stop_tx,
		}) = self.running.take()
		else {
			return Ok(());
		};

		// Watchdog strictly first, so no late tick can re-arm the flush flag
		// once the mover has begun its final drain.
		watchdog_stop_tx.send(()).await.ok();
		let watchdog_result = watchdog_handle.await;

		// Sentinel before flush: the level-triggered flag then guarantees the
		// sentinel's batch drains everything queued ahead of it.
		queue.enqueue(QueueEntry::Shutdown);
		flush.raise();
		let mover_result = mover_handle.await;

		// A panicked task must not leave the watcher attached; tear
		// everything down before reporting the join failure.
		self.change_source.detach()?;

		watchdog_result?;
		mover_result?;

		info!("Worker stopped");

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::{
		fs as std_fs,
		sync::Mutex,
	};

	use tempfile::tempdir;
	use tokio::time::sleep;

	/// Change source stub: hands the session queue out to the test so events
	/// can be injected as if they were observed live.
	#[derive(Default)]
	struct ManualSource {
		queue: Arc<Mutex<Option<Arc<EventQueue>>>>,
	}

	impl ManualSource {
		fn handle(&self) -> Arc<Mutex<Option<Arc<EventQueue>>>> {
			Arc::clone(&self.queue)
		}
	}

	impl ChangeSource for ManualSource {
		fn attach(&mut self, _root: &Path, queue: Arc<EventQueue>) -> Result<(), WorkerError> {
			*self.queue.lock().unwrap() = Some(queue);
			Ok(())
		}

		fn detach(&mut self) -> Result<(), WorkerError> {
			*self.queue.lock().unwrap() = None;
			Ok(())
		}
	}

	fn enqueue_file(handle: &Arc<Mutex<Option<Arc<EventQueue>>>>, path: PathBuf) {
		handle
			.lock()
			.unwrap()
			.as_ref()
			.expect("worker is not running")
			.enqueue(QueueEntry::Creation(crate::CreationEvent::file(path)));
	}

	#[tokio::test]
	async fn start_fails_fast_without_configuration() {
		let mut worker = Worker::new(ManualSource::default());
		assert!(matches!(
			worker.start().await,
			Err(WorkerError::MissingSource)
		));

		let src = tempdir().unwrap();
		worker.set_source(src.path()).unwrap();
		assert!(matches!(
			worker.start().await,
			Err(WorkerError::MissingDestination)
		));
	}

	#[tokio::test]
	async fn source_must_be_an_existing_directory() {
		let mut worker = Worker::new(ManualSource::default());

		assert!(matches!(
			worker.set_source("/definitely/not/here"),
			Err(WorkerError::SourceNotFound(_))
		));

		let src = tempdir().unwrap();
		let file = src.path().join("file");
		std_fs::write(&file, b"x").unwrap();
		assert!(matches!(
			worker.set_source(&file),
			Err(WorkerError::SourceNotADirectory(_))
		));
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn reconfiguration_requires_stop() {
		let src = tempdir().unwrap();
		let dst = tempdir().unwrap();

		let mut worker = Worker::new(ManualSource::default());
		worker.set_source(src.path()).unwrap();
		worker.set_destination(dst.path()).unwrap();
		worker.set_threshold(0).unwrap();
		worker.set_timeout(Duration::ZERO).unwrap();

		worker.start().await.unwrap();
		assert!(worker.is_running());

		assert!(matches!(
			worker.set_source(src.path()),
			Err(WorkerError::AlreadyRunning)
		));
		assert!(matches!(
			worker.set_destination(dst.path()),
			Err(WorkerError::AlreadyRunning)
		));
		assert!(matches!(
			worker.set_threshold(5),
			Err(WorkerError::AlreadyRunning)
		));
		assert!(matches!(
			worker.set_timeout(Duration::from_secs(1)),
			Err(WorkerError::AlreadyRunning)
		));
		assert!(matches!(
			worker.start().await,
			Err(WorkerError::AlreadyRunning)
		));

		worker.stop().await.unwrap();
		assert!(!worker.is_running());
		worker.set_threshold(5).unwrap();
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn initial_sync_relocates_pre_existing_content() {
		let src = tempdir().unwrap();
		let dst = tempdir().unwrap();

		std_fs::write(src.path().join("a.txt"), b"a").unwrap();
		std_fs::create_dir(src.path().join("sub")).unwrap();
		std_fs::write(src.path().join("sub/b.txt"), b"b").unwrap();

		let mut worker = Worker::new(ManualSource::default());
		worker.set_source(src.path()).unwrap();
		worker.set_destination(dst.path()).unwrap();
		worker.set_threshold(0).unwrap();
		worker.set_timeout(Duration::ZERO).unwrap();

		worker.start().await.unwrap();
		worker.stop().await.unwrap();

		assert_eq!(std_fs::read(dst.path().join("a.txt")).unwrap(), b"a");
		assert_eq!(std_fs::read(dst.path().join("sub/b.txt")).unwrap(), b"b");
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn stop_drains_fully_and_is_idempotent() {
		let src = tempdir().unwrap();
		let dst = tempdir().unwrap();

		for i in 0..3 {
			std_fs::write(src.path().join(format!("f{i}")), b"x").unwrap();
		}

		let source = ManualSource::default();
		let handle = source.handle();

		let mut worker = Worker::new(source);
		worker.set_source(src.path()).unwrap();
		worker.set_destination(dst.path()).unwrap();
		// High threshold and no idle flush: nothing moves until stop.
		worker.set_threshold(100).unwrap();
		worker.set_timeout(Duration::ZERO).unwrap();

		worker.start().await.unwrap();

		sleep(Duration::from_millis(300)).await;
		assert_eq!(std_fs::read_dir(dst.path()).unwrap().count(), 0);

		worker.stop().await.unwrap();
		for i in 0..3 {
			assert!(dst.path().join(format!("f{i}")).is_file());
		}
		assert!(handle.lock().unwrap().is_none());

		// A second stop is a no-op.
		worker.stop().await.unwrap();
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn stop_detaches_the_source_even_if_the_mover_panicked() {
		let mut source = ManualSource::default();
		let handle = source.handle();

		let queue = Arc::new(EventQueue::new());
		let flush = Arc::new(FlushFlag::default());
		source.attach(Path::new("/"), Arc::clone(&queue)).unwrap();

		let (watchdog_stop_tx, watchdog_stop_rx) = chan::bounded(1);
		let activities = Activities {
			queue,
			flush: Arc::clone(&flush),
			mover_handle: spawn(async { panic!("mover crashed") }),
			watchdog_handle: spawn(watchdog::run(
				Duration::ZERO,
				Arc::new(ActivityTracker::new()),
				flush,
				watchdog_stop_rx,
			)),
			watchdog_stop_tx,
		};

		let mut worker = Worker::new(source);
		worker.running = Some(activities);

		assert!(matches!(
			worker.stop().await,
			Err(WorkerError::TaskJoin(_))
		));

		// The join failure still surfaced, but teardown ran to completion.
		assert!(!worker.is_running());
		assert!(handle.lock().unwrap().is_none());
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn queue_is_recreated_across_sessions() {
		let src = tempdir().unwrap();
		let dst = tempdir().unwrap();

		let source = ManualSource::default();
		let handle = source.handle();

		let mut worker = Worker::new(source);
		worker.set_source(src.path()).unwrap();
		worker.set_destination(dst.path()).unwrap();
		worker.set_threshold(0).unwrap();
		worker.set_timeout(Duration::ZERO).unwrap();

		worker.start().await.unwrap();
		let first_queue = Arc::clone(handle.lock().unwrap().as_ref().unwrap());
		worker.stop().await.unwrap();

		worker.start().await.unwrap();
		let second_queue = Arc::clone(handle.lock().unwrap().as_ref().unwrap());
		assert!(!Arc::ptr_eq(&first_queue, &second_queue));

		// The fresh session still moves live events end to end.
		std_fs::write(src.path().join("live"), b"x").unwrap();
		enqueue_file(&handle, src.path().join("live"));

		for _ in 0..50 {
			if dst.path().join("live").is_file() {
				break;
			}
			sleep(Duration::from_millis(100)).await;
		}
		assert!(dst.path().join("live").is_file());

		worker.stop().await.unwrap();
	}
}
