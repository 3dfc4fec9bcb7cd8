//! The reconciled task list and its watch metadata.
//!
//! [`TaskStore`] is the single point of truth for what the watched file
//! currently contains. It is a thin wrapper around a
//! [`tokio::sync::watch`] channel: every write goes through
//! [`watch::Sender::send_if_modified`], which both serializes writers and
//! lets a write that changes nothing skip notifying subscribers.
//!
//! Writes are crate-private and tagged with a session generation. A write
//! carrying a generation other than the current one is dropped, so a
//! deferred callback from a torn-down session can never touch the state of
//! its successor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::types::{TaskCounts, TaskRecord};

/// A point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// The sorted task list.
    pub tasks: Vec<TaskRecord>,
    /// When the list last actually changed.
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether a file or directory watch is currently armed.
    pub is_watching: bool,
    /// The canonical watched path, or `None` when nothing is watched.
    pub watched_path: Option<PathBuf>,
    /// Most recent read failure, cleared by the next successful parse.
    pub last_error: Option<String>,
    /// Generation of the current watch session.
    pub generation: u64,
}

impl TaskSnapshot {
    /// Tallies the snapshot's tasks by status.
    #[must_use]
    pub fn counts(&self) -> TaskCounts {
        TaskCounts::from_tasks(&self.tasks)
    }
}

/// Shared handle to the task state.
///
/// Cloning is cheap; all clones observe and update the same state.
#[derive(Debug, Clone)]
pub struct TaskStore {
    state: Arc<watch::Sender<TaskSnapshot>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty store with no watched path.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TaskSnapshot::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    ///
    /// The receiver is woken only by writes that changed something.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.state.borrow().tasks.clone()
    }

    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_updated
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.state.borrow().is_watching
    }

    #[must_use]
    pub fn watched_path(&self) -> Option<PathBuf> {
        self.state.borrow().watched_path.clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    /// Returns the generation of the current watch session.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Returns true if `generation` still names the current session.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Returns the watched path and session generation from one read.
    pub(crate) fn watch_target(&self) -> (Option<PathBuf>, u64) {
        let state = self.state.borrow();
        (state.watched_path.clone(), state.generation)
    }

    /// Starts a new session on `path` and returns its generation.
    ///
    /// The previous error is cleared. Tasks belonging to a different path
    /// are dropped without bumping `last_updated`.
    pub(crate) fn begin_session(&self, path: &Path) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;

            if state.watched_path.as_deref() != Some(path) {
                state.tasks.clear();
                state.watched_path = Some(path.to_path_buf());
            }
            state.last_error = None;
            state.is_watching = false;
        });
        debug!(path = %path.display(), generation, "Began watch session");
        generation
    }

    /// Ends the current session and returns the new generation.
    ///
    /// The watched path and tasks are kept for display; only the watching
    /// flag drops.
    pub(crate) fn end_session(&self) -> u64 {
        let mut generation = 0;
        self.state.send_if_modified(|state| {
            state.generation += 1;
            generation = state.generation;
            let was_watching = state.is_watching;
            state.is_watching = false;
            was_watching
        });
        generation
    }

    /// Replaces the task list if it differs by value from the current one.
    ///
    /// A successful parse clears `last_error` either way. Returns true if
    /// the task list changed.
    pub(crate) fn commit(&self, generation: u64, tasks: Vec<TaskRecord>) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                trace!(generation, current = state.generation, "Dropping stale commit");
                return false;
            }

            let had_error = state.last_error.take().is_some();
            if state.tasks == tasks {
                return had_error;
            }

            state.tasks = tasks;
            state.last_updated = Some(Utc::now());
            changed = true;
            true
        });

        if changed {
            debug!(generation, "Committed new task list");
        }
        changed
    }

    /// Records a read failure. The task list is left unchanged.
    pub(crate) fn record_error(&self, generation: u64, message: String) {
        self.state.send_if_modified(|state| {
            if state.generation != generation || state.last_error.as_ref() == Some(&message) {
                return false;
            }
            state.last_error = Some(message);
            true
        });
    }

    /// Empties the task list and clears `last_error` without touching
    /// `last_updated`.
    pub(crate) fn clear_tasks(&self, generation: u64) {
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            let had_error = state.last_error.take().is_some();
            if state.tasks.is_empty() {
                return had_error;
            }
            state.tasks.clear();
            true
        });
    }

    pub(crate) fn set_watching(&self, generation: u64, watching: bool) {
        self.state.send_if_modified(|state| {
            if state.generation != generation || state.is_watching == watching {
                return false;
            }
            state.is_watching = watching;
            true
        });
    }
}
