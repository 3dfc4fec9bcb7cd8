//! Error types for the todowatch monitor.
//!
//! This module defines the error types used throughout the monitor crate,
//! providing structured error handling with clear, human-readable messages.
//!
//! # Taxonomy
//!
//! - [`MonitorError::Read`]: the watched file could not be read (vanished
//!   mid-read, permissions, invalid UTF-8). Recovered locally and surfaced
//!   only as the store's `last_error`.
//! - [`MonitorError::WatchSetup`]: an OS watch handle could not be opened.
//!   The watcher keeps running on poll fallback alone.
//!
//! Malformed checklist lines are never errors: the parser skips them.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during monitor operations.
///
/// This is the primary error type for the monitor crate, encompassing all
/// possible failure modes.
///
/// # Examples
///
/// ```no_run
/// use todowatch_monitor::error::MonitorError;
/// use todowatch_monitor::preferences::Preferences;
///
/// fn load_preferences() -> Result<Preferences, MonitorError> {
///     let contents = std::fs::read_to_string("preferences.json")?;
///     let prefs: Preferences = serde_json::from_str(&contents)?;
///     Ok(prefs)
/// }
/// ```
#[derive(Error, Debug)]
pub enum MonitorError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The watched task file could not be read.
    ///
    /// The current task list is left untouched when this occurs.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A file or directory watch could not be armed.
    #[error("failed to watch {}: {source}", path.display())]
    WatchSetup {
        /// Path the watch was requested for.
        path: PathBuf,
        /// Underlying notify failure.
        #[source]
        source: notify::Error,
    },

    /// The path handed to the watcher has no file name component.
    #[error("not a file path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MonitorError = io_err.into();
        assert!(matches!(err, MonitorError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn monitor_error_json_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let err: MonitorError = json_err.into();
        assert!(matches!(err, MonitorError::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn read_error_display_names_path() {
        let err = MonitorError::Read {
            path: PathBuf::from("/tmp/todo.md"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
        };
        assert_eq!(err.to_string(), "failed to read /tmp/todo.md: access denied");
    }

    #[test]
    fn watch_setup_error_display_names_path() {
        let err = MonitorError::WatchSetup {
            path: PathBuf::from("/tmp"),
            source: notify::Error::generic("inotify limit reached"),
        };
        assert!(err.to_string().starts_with("failed to watch /tmp: "));
        assert!(err.to_string().contains("inotify limit reached"));
    }

    #[test]
    fn invalid_path_display() {
        let err = MonitorError::InvalidPath(PathBuf::from("/"));
        assert_eq!(err.to_string(), "not a file path: /");
    }

    #[test]
    fn read_error_source_chain() {
        use std::error::Error;

        let err = MonitorError::Read {
            path: PathBuf::from("todo.md"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };

        assert!(err.source().is_some());
    }

    #[test]
    fn result_type_alias_works() {
        fn example_function() -> Result<i32> {
            Ok(42)
        }

        fn example_error_function() -> Result<i32> {
            Err(MonitorError::InvalidPath(PathBuf::from("/")))
        }

        assert!(example_function().is_ok());
        assert!(example_error_function().is_err());
    }
}
