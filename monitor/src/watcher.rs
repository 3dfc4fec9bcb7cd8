//! The watch-and-reconcile service.
//!
//! [`TaskWatcher`] ties the pieces together: it owns the current
//! [`WatchSession`], turns its signals into debounced re-parse requests,
//! runs the poll fallback and commits parse results into the [`TaskStore`].
//!
//! # Architecture
//!
//! ```text
//!  notify (file) ──┐
//!  notify (dir) ───┼─► signal task ─► Debouncer ─► reparse task ─► TaskStore
//!  poll ticker ────┘        │                             ▲
//!                           └─ grace / recreate timers ───┘
//! ```
//!
//! Every session is stamped with a generation from the store. Each deferred
//! step (a queued signal, a debounced request, a grace-period timer) carries
//! the generation it was created under and is dropped if the store has
//! moved on. Starting or stopping a session bumps the generation, so no
//! callback can outlive the session it belongs to.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use todowatch_monitor::config::WatcherConfig;
//! use todowatch_monitor::discovery::NoDiscovery;
//! use todowatch_monitor::preferences::MemoryPreferenceStore;
//! use todowatch_monitor::watcher::TaskWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = TaskWatcher::new(
//!         WatcherConfig::default(),
//!         Arc::new(MemoryPreferenceStore::default()),
//!         Arc::new(NoDiscovery),
//!     );
//!     watcher.start_watching("~/todo.md")?;
//!
//!     let mut changes = watcher.subscribe();
//!     while changes.changed().await.is_ok() {
//!         println!("{} tasks", changes.borrow().tasks.len());
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::WatcherConfig;
use crate::discovery::PathDiscovery;
use crate::error::{MonitorError, Result};
use crate::parser::{parse, parse_file};
use crate::poll::PollFallback;
use crate::preferences::PreferenceStore;
use crate::session::{SessionEvent, Signal, WatchSession};
use crate::store::{TaskSnapshot, TaskStore};
use crate::utils::debounce::Debouncer;
use crate::utils::paths::WatchTarget;

/// Capacity of the queue between notify callbacks and the signal task.
const SIGNAL_CAPACITY: usize = 256;

/// Capacity of the queue between the debouncer and the reparse task.
const REPARSE_CAPACITY: usize = 64;

/// Live task-file watcher.
///
/// Must be created inside a Tokio runtime. Dropping it releases all OS
/// watch handles and stops the background tasks.
pub struct TaskWatcher {
    inner: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    store: TaskStore,
    config: WatcherConfig,
    session: Mutex<Option<WatchSession>>,
    signal_tx: mpsc::Sender<SessionEvent>,
    debouncer: Debouncer<PathBuf, u64>,
    preferences: Arc<dyn PreferenceStore>,
    discovery: Arc<dyn PathDiscovery>,
    auto_detect: AtomicBool,
    reparse_count: AtomicU64,
}

impl TaskWatcher {
    /// Creates an idle watcher and starts its background tasks.
    ///
    /// The auto-detect flag starts from the stored preferences. Nothing is
    /// watched until [`start_watching`](Self::start_watching) or
    /// [`bootstrap`](Self::bootstrap) is called.
    #[must_use]
    pub fn new(
        config: WatcherConfig,
        preferences: Arc<dyn PreferenceStore>,
        discovery: Arc<dyn PathDiscovery>,
    ) -> Self {
        let store = TaskStore::new();
        let (signal_tx, mut signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (reparse_tx, mut reparse_rx) = mpsc::channel::<(PathBuf, u64)>(REPARSE_CAPACITY);
        let auto_detect = preferences.load().auto_detect;

        let inner = Arc::new(Shared {
            store: store.clone(),
            config,
            session: Mutex::new(None),
            signal_tx,
            debouncer: Debouncer::new(config.debounce, reparse_tx),
            preferences,
            discovery,
            auto_detect: AtomicBool::new(auto_detect),
            reparse_count: AtomicU64::new(0),
        });

        let signal_task = {
            let shared = Arc::clone(&inner);
            tokio::spawn(async move {
                while let Some(event) = signal_rx.recv().await {
                    shared.handle_signal(event);
                }
            })
        };

        // Debounced requests are handled one at a time, which keeps commits
        // in request order
        let reparse_task = {
            let shared = Arc::clone(&inner);
            tokio::spawn(async move {
                while let Some((path, generation)) = reparse_rx.recv().await {
                    if !shared.store.is_current(generation) {
                        trace!(generation, "Dropping stale debounced re-parse");
                        continue;
                    }
                    shared.reparse_count.fetch_add(1, Ordering::Relaxed);
                    shared.reparse(&path, generation).await;
                }
            })
        };

        let poll_task = {
            let shared = Arc::clone(&inner);
            PollFallback::new(config.poll_interval).spawn(store, move |path, generation| {
                shared.request_reparse(path, generation);
            })
        };

        Self {
            inner,
            tasks: vec![signal_task, reparse_task, poll_task],
        }
    }

    /// Overrides the auto-detect flag without persisting it.
    #[must_use]
    pub fn with_auto_detect(self, enabled: bool) -> Self {
        self.inner.auto_detect.store(enabled, Ordering::Relaxed);
        self
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    /// Subscribes to store changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.inner.store.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        self.inner.store.snapshot()
    }

    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn auto_detect(&self) -> bool {
        self.inner.auto_detect.load(Ordering::Relaxed)
    }

    /// Number of debounced re-parse passes run so far.
    ///
    /// The synchronous parse in `start_watching` and direct `refresh` calls
    /// are not counted.
    #[must_use]
    pub fn reparse_count(&self) -> u64 {
        self.inner.reparse_count.load(Ordering::Relaxed)
    }

    /// Starts watching `path`, replacing any current session.
    ///
    /// A leading `~` is expanded. If the file exists it is parsed before
    /// this returns. The path is saved to preferences.
    ///
    /// Watch setup failures are not errors: the store's `is_watching` stays
    /// false and the poll fallback keeps the list current.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidPath`] if `path` has no file name.
    pub fn start_watching(&self, path: impl AsRef<Path>) -> Result<()> {
        let target = self.inner.watch(path.as_ref())?;

        if let Err(e) = self.inner.preferences.save_path(&target.path) {
            warn!(path = %target.path.display(), error = %e, "Failed to save watched path");
        }
        Ok(())
    }

    /// Tears down the current session. Safe to call when idle.
    ///
    /// The watched path and last task list stay visible, and the poll
    /// fallback keeps re-parsing that path.
    pub fn stop_watching(&self) {
        self.inner.stop();
    }

    /// Re-parses the watched path now, or runs discovery when there is no
    /// path and auto-detect is on.
    pub async fn refresh(&self) {
        let snapshot = self.inner.store.snapshot();
        match snapshot.watched_path {
            Some(path) => self.inner.reparse(&path, snapshot.generation).await,
            None if self.auto_detect() => {
                self.detect().await;
            }
            None => debug!("Refresh requested with nothing to watch"),
        }
    }

    /// Enables or disables auto-detection and saves the choice.
    ///
    /// Enabling runs discovery immediately.
    pub async fn set_auto_detect(&self, enabled: bool) {
        self.inner.auto_detect.store(enabled, Ordering::Relaxed);
        if let Err(e) = self.inner.preferences.save_auto_detect(enabled) {
            warn!(error = %e, "Failed to save auto-detect preference");
        }

        if enabled {
            self.detect().await;
        }
    }

    /// Runs path discovery and watches the result, if any.
    ///
    /// A discovered path is not saved to preferences.
    pub async fn detect(&self) -> Option<PathBuf> {
        let discovery = Arc::clone(&self.inner.discovery);
        let found = match tokio::task::spawn_blocking(move || discovery.discover()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Path discovery task failed");
                return None;
            }
        };

        let Some(path) = found else {
            info!("No task file found");
            return None;
        };

        match self.inner.watch(&path) {
            Ok(target) => Some(target.path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discovered path cannot be watched");
                None
            }
        }
    }

    /// Picks the initial file from preferences.
    ///
    /// With auto-detect on, discovery decides. Otherwise the saved path is
    /// watched if there is one.
    pub async fn bootstrap(&self) {
        if self.auto_detect() {
            self.detect().await;
            return;
        }

        let Some(saved) = self.inner.preferences.load().saved_path else {
            debug!("No saved path and auto-detect is off");
            return;
        };

        if let Err(e) = self.inner.watch(&saved) {
            warn!(path = %saved.display(), error = %e, "Saved path cannot be watched");
        }
    }

    #[cfg(test)]
    fn inject(&self, signal: Signal) {
        let generation = self.inner.store.generation();
        self.inner.handle_signal(SessionEvent { generation, signal });
    }
}

impl Drop for TaskWatcher {
    fn drop(&mut self) {
        self.inner.stop();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl fmt::Debug for TaskWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWatcher")
            .field("store", &self.inner.store)
            .field("config", &self.inner.config)
            .field("auto_detect", &self.auto_detect())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Replaces the current session with one on `path`.
    fn watch(&self, path: &Path) -> Result<WatchTarget> {
        let target = WatchTarget::resolve(path)?;

        let mut slot = self.session.lock();

        // Release the old handles before opening new ones
        drop(slot.take());
        self.debouncer.clear();

        let generation = self.store.begin_session(&target.path);
        let mut session = WatchSession::new(generation, target.clone(), self.signal_tx.clone());

        if target.path.exists() {
            match parse_file(&target.path) {
                Ok(tasks) => {
                    self.store.commit(generation, tasks);
                }
                Err(e) => {
                    warn!(error = %e, "Initial read failed");
                    self.store.record_error(generation, e.to_string());
                }
            }

            if let Err(e) = session.arm_file() {
                warn!(error = %e, "File watch unavailable");
            }
        }

        if let Err(e) = session.arm_directory() {
            warn!(error = %e, "Directory watch unavailable, relying on polling");
        }

        let watching = session.is_armed();
        self.store.set_watching(generation, watching);
        *slot = Some(session);
        drop(slot);

        info!(
            path = %target.path.display(),
            generation,
            watching,
            "Started watching task file"
        );
        Ok(target)
    }

    fn stop(&self) {
        let mut slot = self.session.lock();
        let previous = slot.take();
        self.debouncer.clear();
        let generation = self.store.end_session();
        drop(slot);

        if let Some(session) = previous {
            info!(
                path = %session.target().path.display(),
                generation,
                "Stopped watching task file"
            );
        }
    }

    /// Returns the watched path if `generation` is still live.
    fn live_path(&self, generation: u64) -> Option<PathBuf> {
        self.session
            .lock()
            .as_ref()
            .filter(|session| session.generation() == generation)
            .map(|session| session.target().path.clone())
    }

    fn file_armed(&self, generation: u64) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| session.generation() == generation && session.is_file_armed())
    }

    fn request_reparse(&self, path: &Path, generation: u64) {
        if !self.debouncer.try_send(path.to_path_buf(), generation) {
            warn!(path = %path.display(), "Failed to queue re-parse, debouncer is busy");
        }
    }

    fn handle_signal(self: &Arc<Self>, event: SessionEvent) {
        let SessionEvent { generation, signal } = event;
        let Some(path) = self.live_path(generation) else {
            trace!(generation, ?signal, "Dropping signal from stale session");
            return;
        };

        match signal {
            Signal::FileChanged => {
                trace!(path = %path.display(), "File changed");
                self.request_reparse(&path, generation);
            }
            Signal::FileRemoved => self.on_file_removed(path, generation),
            Signal::DirectoryChanged { recreated } => {
                if !path.exists() {
                    return;
                }

                // In-place writes also show up on the directory; the file
                // watch already queued a re-parse for those
                if !recreated && self.file_armed(generation) {
                    trace!(path = %path.display(), "Directory event covered by file watch");
                    return;
                }

                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(shared.config.recreate_delay).await;
                    shared.rearm(&path, generation, recreated);
                });
            }
        }
    }

    fn on_file_removed(self: &Arc<Self>, path: PathBuf, generation: u64) {
        debug!(path = %path.display(), generation, "Task file removed or renamed");

        // Stale tasks must not stay visible while the file is gone
        self.store.clear_tasks(generation);

        {
            let mut slot = self.session.lock();
            if let Some(session) = slot.as_mut().filter(|s| s.generation() == generation) {
                session.disarm_file();
                self.store.set_watching(generation, session.is_armed());
            }
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(shared.config.grace_period).await;

            if !shared.store.is_current(generation) {
                trace!(generation, "Grace period ended for stale session");
                return;
            }
            if path.exists() {
                shared.rearm(&path, generation, true);
            } else {
                debug!(path = %path.display(), "Task file still missing, waiting on directory watch");
            }
        });
    }

    /// Re-arms the file watch if needed and schedules a re-parse.
    fn rearm(&self, path: &Path, generation: u64, force: bool) {
        {
            let mut slot = self.session.lock();
            let Some(session) = slot.as_mut().filter(|s| s.generation() == generation) else {
                trace!(generation, "Skipping re-arm for stale session");
                return;
            };

            if force || !session.is_file_armed() {
                match session.arm_file() {
                    Ok(()) => info!(path = %path.display(), "Re-armed file watch"),
                    Err(e) => warn!(error = %e, "Failed to re-arm file watch"),
                }
            }
            self.store.set_watching(generation, session.is_armed());
        }

        self.request_reparse(path, generation);
    }

    /// Reads and parses `path`, committing the result.
    ///
    /// A missing file is skipped silently; any other read failure is
    /// recorded as the store's last error.
    async fn reparse(&self, path: &Path, generation: u64) {
        if !self.store.is_current(generation) {
            return;
        }

        if !matches!(tokio::fs::try_exists(path).await, Ok(true)) {
            trace!(path = %path.display(), "Skipping re-parse of missing file");
            return;
        }

        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let tasks = parse(&text);
                let task_count = tasks.len();
                if self.store.commit(generation, tasks) {
                    debug!(path = %path.display(), task_count, "Task list updated");
                }
            }
            Err(source) => {
                let err = MonitorError::Read {
                    path: path.to_path_buf(),
                    source,
                };
                warn!(error = %err, "Re-parse failed");
                self.store.record_error(generation, err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::NoDiscovery;
    use crate::preferences::{MemoryPreferenceStore, Preferences};
    use crate::types::{Priority, TaskStatus};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    struct FixedDiscovery(PathBuf);

    impl PathDiscovery for FixedDiscovery {
        fn discover(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    /// Timings short enough for tests, with polling effectively off.
    fn test_config() -> WatcherConfig {
        WatcherConfig {
            debounce: Duration::from_millis(50),
            poll_interval: Duration::from_secs(3600),
            grace_period: Duration::from_millis(100),
            recreate_delay: Duration::from_millis(20),
        }
    }

    fn test_watcher(prefs: Arc<MemoryPreferenceStore>) -> TaskWatcher {
        TaskWatcher::new(test_config(), prefs, Arc::new(NoDiscovery))
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    async fn wait_until(watcher: &TaskWatcher, pred: impl Fn(&TaskSnapshot) -> bool) -> bool {
        let mut rx = watcher.subscribe();
        timeout(Duration::from_secs(5), async {
            loop {
                if pred(&rx.borrow_and_update()) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn start_watching_parses_immediately() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] Fix bug [HIGH]\n- [~] Review");
        let watcher = test_watcher(Arc::default());

        watcher.start_watching(&path).unwrap();

        let snapshot = watcher.snapshot();
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].status, TaskStatus::InProgress);
        assert_eq!(snapshot.tasks[1].priority, Priority::High);
        assert!(snapshot.is_watching);
        assert!(snapshot.last_updated.is_some());
        assert_eq!(snapshot.watched_path, Some(path));
    }

    #[tokio::test]
    async fn start_watching_saves_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let prefs = Arc::new(MemoryPreferenceStore::default());
        let watcher = test_watcher(Arc::clone(&prefs));

        watcher.start_watching(&path).unwrap();

        assert_eq!(prefs.load().saved_path, Some(path));
    }

    #[tokio::test]
    async fn start_watching_missing_file_arms_directory() {
        let dir = TempDir::new().unwrap();
        let watcher = test_watcher(Arc::default());

        watcher.start_watching(dir.path().join("todo.md")).unwrap();

        let snapshot = watcher.snapshot();
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.is_watching);
        assert!(snapshot.last_updated.is_none());
    }

    #[tokio::test]
    async fn start_watching_rejects_root() {
        let watcher = test_watcher(Arc::default());
        let err = watcher.start_watching("/").unwrap_err();
        assert!(matches!(err, MonitorError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_not_watching() {
        let dir = TempDir::new().unwrap();
        let watcher = test_watcher(Arc::default());

        watcher
            .start_watching(dir.path().join("nope/todo.md"))
            .unwrap();

        assert!(!watcher.snapshot().is_watching);
        assert!(watcher.snapshot().watched_path.is_some());
    }

    #[tokio::test]
    async fn stop_watching_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());

        watcher.stop_watching();
        watcher.start_watching(&path).unwrap();
        watcher.stop_watching();
        watcher.stop_watching();

        let snapshot = watcher.snapshot();
        assert!(!snapshot.is_watching);
        assert_eq!(snapshot.tasks.len(), 1);
    }

    #[tokio::test]
    async fn delete_then_recreate_restores_tasks() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] Old one\n- [ ] Old two");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();
        assert_eq!(watcher.snapshot().tasks.len(), 2);

        watcher.inject(Signal::FileRemoved);

        let snapshot = watcher.snapshot();
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.is_watching);

        fs::write(&path, "- [x] New content").unwrap();

        assert!(
            wait_until(&watcher, |s| s.tasks.len() == 1 && s.tasks[0].content == "New content").await
        );
        assert!(watcher.snapshot().is_watching);
    }

    #[tokio::test]
    async fn burst_collapses_to_one_reparse() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();

        for _ in 0..100 {
            watcher.inject(Signal::FileChanged);
        }
        sleep(Duration::from_millis(300)).await;

        assert_eq!(watcher.reparse_count(), 1);
    }

    #[tokio::test]
    async fn directory_write_event_defers_to_file_watch() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();

        watcher.inject(Signal::DirectoryChanged { recreated: false });
        sleep(Duration::from_millis(200)).await;

        assert_eq!(watcher.reparse_count(), 0);
    }

    #[tokio::test]
    async fn directory_recreate_event_reparses() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();

        watcher.inject(Signal::DirectoryChanged { recreated: true });
        sleep(Duration::from_millis(200)).await;

        assert_eq!(watcher.reparse_count(), 1);
        assert!(watcher.snapshot().is_watching);
    }

    #[tokio::test]
    async fn identical_reparse_keeps_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a\n- [x] b");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();
        let stamp = watcher.snapshot().last_updated;

        watcher.refresh().await;
        watcher.refresh().await;

        assert_eq!(watcher.snapshot().last_updated, stamp);
    }

    #[tokio::test]
    async fn refresh_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();

        fs::write(&path, "- [ ] a\n- [ ] b\n- [ ] c").unwrap();
        watcher.refresh().await;

        assert_eq!(watcher.snapshot().tasks.len(), 3);
    }

    #[tokio::test]
    async fn read_error_keeps_tasks_and_clears_on_success() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();

        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();
        watcher.refresh().await;

        let snapshot = watcher.snapshot();
        assert_eq!(snapshot.tasks.len(), 1);
        let message = snapshot.last_error.unwrap();
        assert!(message.starts_with("failed to read "), "{message}");

        fs::write(&path, "- [ ] a").unwrap();
        watcher.refresh().await;
        assert!(watcher.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn delete_after_read_error_clears_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] a");
        let watcher = test_watcher(Arc::default());
        watcher.start_watching(&path).unwrap();

        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();
        watcher.refresh().await;
        assert!(watcher.snapshot().last_error.is_some());

        fs::remove_file(&path).unwrap();
        watcher.inject(Signal::FileRemoved);

        let snapshot = watcher.snapshot();
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn stale_grace_timer_does_not_touch_new_session() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let path_a = write_file(&dir_a, "todo.md", "- [ ] from a");
        let path_b = write_file(&dir_b, "todo.md", "- [ ] from b one\n- [ ] from b two");
        let watcher = test_watcher(Arc::default());

        watcher.start_watching(&path_a).unwrap();
        watcher.inject(Signal::FileRemoved);
        watcher.stop_watching();
        watcher.start_watching(&path_b).unwrap();

        // Past the grace period and a debounce window
        sleep(Duration::from_millis(300)).await;

        let snapshot = watcher.snapshot();
        assert_eq!(snapshot.watched_path, Some(path_b));
        assert_eq!(snapshot.tasks.len(), 2);
        assert!(snapshot.tasks.iter().all(|t| t.content.starts_with("from b")));
        assert!(snapshot.is_watching);
    }

    #[tokio::test]
    async fn stale_debounced_reparse_does_not_touch_new_session() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let path_a = write_file(&dir_a, "todo.md", "- [ ] from a");
        let path_b = write_file(&dir_b, "todo.md", "- [ ] from b");
        let watcher = test_watcher(Arc::default());

        watcher.start_watching(&path_a).unwrap();
        let stale = watcher.snapshot().generation;
        watcher.inject(Signal::FileChanged);
        watcher.stop_watching();
        watcher.start_watching(&path_b).unwrap();

        // A signal from the old session arriving late
        watcher.inner.handle_signal(SessionEvent {
            generation: stale,
            signal: Signal::FileChanged,
        });
        sleep(Duration::from_millis(200)).await;

        let snapshot = watcher.snapshot();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].content, "from b");
        assert_eq!(watcher.reparse_count(), 0);
    }

    #[tokio::test]
    async fn switching_paths_replaces_tasks() {
        let dir = TempDir::new().unwrap();
        let path_a = write_file(&dir, "a.md", "- [ ] a1\n- [ ] a2");
        let path_b = write_file(&dir, "b.md", "- [ ] b1");
        let watcher = test_watcher(Arc::default());

        watcher.start_watching(&path_a).unwrap();
        watcher.start_watching(&path_b).unwrap();

        let snapshot = watcher.snapshot();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].content, "b1");
        assert_eq!(snapshot.watched_path, Some(path_b));
    }

    #[tokio::test]
    async fn poll_fallback_catches_missed_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/todo.md");
        let config = WatcherConfig {
            poll_interval: Duration::from_millis(150),
            ..test_config()
        };
        let watcher = TaskWatcher::new(
            config,
            Arc::new(MemoryPreferenceStore::default()),
            Arc::new(NoDiscovery),
        );

        // Parent does not exist yet, so no OS watch can be armed
        watcher.start_watching(&path).unwrap();
        assert!(!watcher.snapshot().is_watching);

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "- [ ] polled").unwrap();

        assert!(wait_until(&watcher, |s| s.tasks.len() == 1).await);
        assert!(!watcher.snapshot().is_watching);
    }

    #[tokio::test]
    async fn set_auto_detect_runs_discovery() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] found");
        let prefs = Arc::new(MemoryPreferenceStore::new(Preferences {
            saved_path: None,
            auto_detect: false,
        }));
        let watcher = TaskWatcher::new(test_config(), prefs.clone(), Arc::new(FixedDiscovery(path.clone())));
        assert!(!watcher.auto_detect());

        watcher.set_auto_detect(true).await;

        assert!(watcher.auto_detect());
        assert!(prefs.load().auto_detect);
        assert_eq!(watcher.snapshot().watched_path, Some(path));
        assert!(prefs.load().saved_path.is_none());
    }

    #[tokio::test]
    async fn disabling_auto_detect_only_persists() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] found");
        let prefs = Arc::new(MemoryPreferenceStore::default());
        let watcher = TaskWatcher::new(test_config(), prefs.clone(), Arc::new(FixedDiscovery(path)));

        watcher.set_auto_detect(false).await;

        assert!(!prefs.load().auto_detect);
        assert!(watcher.snapshot().watched_path.is_none());
    }

    #[tokio::test]
    async fn refresh_without_path_detects() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "todo.md", "- [ ] found");
        let watcher = TaskWatcher::new(
            test_config(),
            Arc::new(MemoryPreferenceStore::default()),
            Arc::new(FixedDiscovery(path.clone())),
        );

        watcher.refresh().await;

        assert_eq!(watcher.snapshot().watched_path, Some(path));
        assert_eq!(watcher.snapshot().tasks.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_uses_saved_path_when_auto_detect_off() {
        let dir = TempDir::new().unwrap();
        let saved = write_file(&dir, "saved.md", "- [ ] saved");
        let found = write_file(&dir, "found.md", "- [ ] found");
        let prefs = Arc::new(MemoryPreferenceStore::new(Preferences {
            saved_path: Some(saved.clone()),
            auto_detect: false,
        }));
        let watcher = TaskWatcher::new(test_config(), prefs, Arc::new(FixedDiscovery(found)));

        watcher.bootstrap().await;

        assert_eq!(watcher.snapshot().watched_path, Some(saved));
    }

    #[tokio::test]
    async fn bootstrap_prefers_discovery_when_auto_detect_on() {
        let dir = TempDir::new().unwrap();
        let saved = write_file(&dir, "saved.md", "- [ ] saved");
        let found = write_file(&dir, "found.md", "- [ ] found");
        let prefs = Arc::new(MemoryPreferenceStore::new(Preferences {
            saved_path: Some(saved.clone()),
            auto_detect: true,
        }));
        let watcher = TaskWatcher::new(test_config(), prefs.clone(), Arc::new(FixedDiscovery(found.clone())));

        watcher.bootstrap().await;

        assert_eq!(watcher.snapshot().watched_path, Some(found));
        assert_eq!(prefs.load().saved_path, Some(saved));
    }

    #[tokio::test]
    async fn with_auto_detect_overrides_without_saving() {
        let prefs = Arc::new(MemoryPreferenceStore::default());
        let watcher = test_watcher(Arc::clone(&prefs)).with_auto_detect(false);

        assert!(!watcher.auto_detect());
        assert!(prefs.load().auto_detect);
    }
}
