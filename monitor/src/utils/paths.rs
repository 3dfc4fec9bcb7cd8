//! Path helpers for the watched task file.
//!
//! The watcher arms one watch on the file itself and one on its parent
//! directory, filtered by file name. [`WatchTarget`] holds all three pieces
//! in the canonical form both watches agree on.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;

use crate::error::{MonitorError, Result};

/// The canonical form of a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// Parent directory joined with the file name.
    pub path: PathBuf,
    /// Directory that receives the directory-level watch.
    pub directory: PathBuf,
    /// File name used to filter directory events.
    pub file_name: OsString,
}

impl WatchTarget {
    /// Expands `~` and splits `path` into directory and file name.
    ///
    /// A relative path is resolved against the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidPath`] if the path has no file name
    /// (for example `/` or `..`), or [`MonitorError::Io`] if the current
    /// directory is needed and cannot be determined.
    pub fn resolve(path: &Path) -> Result<Self> {
        let expanded = expand_tilde(path);
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(expanded)
        };

        let file_name = absolute
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| MonitorError::InvalidPath(path.to_path_buf()))?;

        let directory = absolute
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| MonitorError::InvalidPath(path.to_path_buf()))?;

        Ok(Self {
            path: directory.join(&file_name),
            directory,
            file_name,
        })
    }
}

/// Replaces a leading `~` component with the home directory.
///
/// Paths without a leading `~`, and `~user` forms, are returned unchanged.
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Abbreviates the home directory prefix to `~` for display.
#[must_use]
pub fn display_path(path: &Path) -> String {
    BaseDirs::new()
        .and_then(|dirs| {
            path.strip_prefix(dirs.home_dir())
                .ok()
                .map(|rest| Path::new("~").join(rest))
        })
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
