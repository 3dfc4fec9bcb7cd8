//! Locating a task file when the user has not picked one.
//!
//! [`TodoFileDiscovery`] looks in a handful of well-known places and then
//! walks the home directory a few levels deep. Of every file found with the
//! target name, the most recently modified one wins.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use directories::BaseDirs;
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

/// Default file name searched for.
pub const DEFAULT_FILE_NAME: &str = "todo.md";

/// How many directory levels below home the walk descends.
const MAX_DEPTH: usize = 4;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "Library", "Applications", ".Trash"];

/// Home-relative directories checked before the walk.
const WELL_KNOWN_DIRS: &[&str] = &["", "Desktop", "Documents", "Developer"];

/// Strategy that proposes a single file to watch.
pub trait PathDiscovery: Send + Sync {
    /// Returns a candidate absolute path, or `None`.
    fn discover(&self) -> Option<PathBuf>;
}

/// Never proposes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiscovery;

impl PathDiscovery for NoDiscovery {
    fn discover(&self) -> Option<PathBuf> {
        None
    }
}

/// Searches the home directory for the newest file with a given name.
#[derive(Debug, Clone)]
pub struct TodoFileDiscovery {
    home: PathBuf,
    file_name: String,
    extra_dirs: Vec<PathBuf>,
}

impl TodoFileDiscovery {
    /// Creates a discovery rooted at the user's home directory that also
    /// checks the current directory.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn new(file_name: impl Into<String>) -> Option<Self> {
        let home = BaseDirs::new()?.home_dir().to_path_buf();
        let mut discovery = Self::with_home(home, file_name);
        if let Ok(cwd) = std::env::current_dir() {
            discovery.extra_dirs.push(cwd);
        }
        Some(discovery)
    }

    /// Creates a discovery rooted at an explicit home directory.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            file_name: file_name.into(),
            extra_dirs: Vec::new(),
        }
    }

    fn well_known_candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WELL_KNOWN_DIRS
            .iter()
            .map(|dir| self.home.join(dir))
            .chain(self.extra_dirs.iter().cloned())
            .map(|dir| dir.join(&self.file_name))
    }

    fn walk_candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.home)
            .max_depth(MAX_DEPTH)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == self.file_name.as_str())
            .map(DirEntry::into_path)
    }
}

impl PathDiscovery for TodoFileDiscovery {
    fn discover(&self) -> Option<PathBuf> {
        let mut best: Option<(SystemTime, PathBuf)> = None;

        for candidate in self.well_known_candidates().chain(self.walk_candidates()) {
            let Some(modified) = modified_time(&candidate) else {
                continue;
            };
            trace!(path = %candidate.display(), "Found candidate task file");

            // Strictly newer only, so earlier candidates win ties
            if best.as_ref().is_none_or(|(newest, _)| modified > *newest) {
                best = Some((modified, candidate));
            }
        }

        let found = best.map(|(_, path)| path);
        debug!(home = %self.home.display(), found = ?found, "Task file discovery finished");
        found
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') || SKIP_DIRS.contains(&name))
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    metadata.modified().ok()
}
