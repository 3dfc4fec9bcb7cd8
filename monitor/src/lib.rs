//! todowatch monitor - live view of a checklist task file.
//!
//! This crate watches a single markdown-style checklist file and keeps a
//! parsed, sorted task list in sync with it as it is edited, truncated,
//! deleted, renamed and recreated.
//!
//! # Overview
//!
//! The [`watcher::TaskWatcher`] service arms a file watch and a directory
//! watch on the target, debounces bursts of filesystem events, polls as a
//! safety net, and commits each parse into a [`store::TaskStore`] only when
//! the list actually changed. Consumers subscribe to the store; they never
//! write to it.
//!
//! The crate never writes to the watched file.
//!
//! # Modules
//!
//! - [`types`]: Task records, status, priority and counts
//! - [`parser`]: Checklist parsing
//! - [`store`]: The reconciled task list with change notification
//! - [`session`]: OS watch handles for one watch session
//! - [`watcher`]: The watch-and-reconcile service
//! - [`poll`]: Fixed-period poll fallback
//! - [`discovery`]: Locating a task file automatically
//! - [`preferences`]: Persisted saved path and auto-detect flag
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations
//! - [`utils`]: Shared utilities (debouncing, path handling)

pub mod config;
pub mod discovery;
pub mod error;
pub mod parser;
pub mod poll;
pub mod preferences;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;
pub mod watcher;

pub use config::{Config, ConfigError, WatcherConfig};
pub use discovery::{NoDiscovery, PathDiscovery, TodoFileDiscovery};
pub use error::{MonitorError, Result};
pub use parser::{parse, parse_file};
pub use preferences::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore, Preferences};
pub use store::{TaskSnapshot, TaskStore};
pub use types::{Priority, TaskCounts, TaskRecord, TaskStatus};
pub use utils::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
pub use watcher::TaskWatcher;
