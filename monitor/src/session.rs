//! OS watch handles for a single watch session.
//!
//! A [`WatchSession`] owns up to two [`RecommendedWatcher`]s:
//!
//! - a **file watch** on the target itself, which catches in-place writes
//!   and notices the file being deleted or renamed away, and
//! - a **directory watch** on the parent, filtered to the target's file
//!   name, which catches the file appearing (first creation, or an editor
//!   swapping a new file into place).
//!
//! The notify callbacks do no work beyond classifying the raw event and
//! queueing a [`SessionEvent`] with `try_send`. All decisions about grace
//! periods, re-arming and re-parsing are made by the watcher task that
//! consumes those events.
//!
//! Dropping a session drops both watchers, which releases the underlying
//! OS handles immediately.

use std::ffi::OsStr;
use std::path::Path;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::error::{MonitorError, Result};
use crate::utils::paths::WatchTarget;

/// What a watch callback observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The file's contents were written.
    FileChanged,
    /// The file was deleted or renamed away.
    FileRemoved,
    /// Something happened to the target's name inside the parent directory.
    DirectoryChanged {
        /// True if the name was created or renamed into place.
        recreated: bool,
    },
}

/// A signal tagged with the generation of the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: u64,
    pub signal: Signal,
}

/// Live OS watches for one generation.
#[derive(Debug)]
pub struct WatchSession {
    generation: u64,
    target: WatchTarget,
    signal_tx: mpsc::Sender<SessionEvent>,
    file_watcher: Option<RecommendedWatcher>,
    dir_watcher: Option<RecommendedWatcher>,
}

impl WatchSession {
    /// Creates a session with nothing armed yet.
    #[must_use]
    pub fn new(generation: u64, target: WatchTarget, signal_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            generation,
            target,
            signal_tx,
            file_watcher: None,
            dir_watcher: None,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Returns true if either watch is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.file_watcher.is_some() || self.dir_watcher.is_some()
    }

    #[must_use]
    pub fn is_file_armed(&self) -> bool {
        self.file_watcher.is_some()
    }

    /// Arms (or re-arms) the file watch, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::WatchSetup`] if the watch cannot be opened,
    /// typically because the file vanished again. The previous file watch
    /// is released either way.
    pub fn arm_file(&mut self) -> Result<()> {
        self.file_watcher = None;

        let generation = self.generation;
        let classify = move |event: Event| {
            classify_file_event(&event.kind).map(|signal| SessionEvent { generation, signal })
        };
        let watcher = create_watcher(&self.target.path, classify, self.signal_tx.clone())?;

        debug!(path = %self.target.path.display(), generation, "Armed file watch");
        self.file_watcher = Some(watcher);
        Ok(())
    }

    /// Releases the file watch, leaving the directory watch in place.
    pub fn disarm_file(&mut self) {
        if self.file_watcher.take().is_some() {
            debug!(path = %self.target.path.display(), "Released file watch");
        }
    }

    /// Arms the directory watch on the target's parent.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::WatchSetup`] if the directory cannot be
    /// watched, for example because it does not exist.
    pub fn arm_directory(&mut self) -> Result<()> {
        self.dir_watcher = None;

        let generation = self.generation;
        let file_name = self.target.file_name.clone();
        let classify = move |event: Event| {
            classify_directory_event(&event, &file_name)
                .map(|signal| SessionEvent { generation, signal })
        };
        let watcher = create_watcher(&self.target.directory, classify, self.signal_tx.clone())?;

        debug!(
            directory = %self.target.directory.display(),
            generation,
            "Armed directory watch"
        );
        self.dir_watcher = Some(watcher);
        Ok(())
    }
}

/// Builds a non-recursive watcher whose callback forwards classified events.
fn create_watcher<F>(
    path: &Path,
    classify: F,
    tx: mpsc::Sender<SessionEvent>,
) -> Result<RecommendedWatcher>
where
    F: Fn(Event) -> Option<SessionEvent> + Send + 'static,
{
    let setup_error = |source| MonitorError::WatchSetup {
        path: path.to_path_buf(),
        source,
    };

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "File watcher error");
                    return;
                }
            };

            trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

            if let Some(session_event) = classify(event) {
                // Never block the notify thread; the poll fallback covers drops
                if let Err(e) = tx.try_send(session_event) {
                    warn!(error = %e, "Failed to queue watch signal, channel may be full");
                }
            }
        },
        Config::default(),
    )
    .map_err(setup_error)?;

    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .map_err(setup_error)?;

    Ok(watcher)
}

/// Maps a file-level event to a signal.
///
/// Metadata-only changes are ignored. A rename counts as removal because
/// the watch follows the old inode, not the name.
#[must_use]
pub fn classify_file_event(kind: &EventKind) -> Option<Signal> {
    match kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => Some(Signal::FileRemoved),
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other)
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(Signal::FileChanged),
        _ => None,
    }
}

/// Maps a directory-level event to a signal if it concerns `file_name`.
#[must_use]
pub fn classify_directory_event(event: &Event, file_name: &OsStr) -> Option<Signal> {
    if matches!(event.kind, EventKind::Access(_)) {
        return None;
    }

    let concerns_target = event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name));
    if !concerns_target {
        return None;
    }

    let recreated = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    Some(Signal::DirectoryChanged { recreated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn file_writes_are_changes() {
        assert_eq!(
            classify_file_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(Signal::FileChanged)
        );
        assert_eq!(
            classify_file_event(&EventKind::Modify(ModifyKind::Any)),
            Some(Signal::FileChanged)
        );
        assert_eq!(
            classify_file_event(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            Some(Signal::FileChanged)
        );
    }

    #[test]
    fn file_delete_and_rename_are_removals() {
        assert_eq!(
            classify_file_event(&EventKind::Remove(RemoveKind::File)),
            Some(Signal::FileRemoved)
        );
        assert_eq!(
            classify_file_event(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(Signal::FileRemoved)
        );
    }

    #[test]
    fn file_metadata_and_reads_are_ignored() {
        assert_eq!(
            classify_file_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(
            classify_file_event(&EventKind::Access(AccessKind::Close(AccessMode::Read))),
            None
        );
    }

    #[test]
    fn directory_event_for_other_file_is_ignored() {
        let ev = event(EventKind::Create(CreateKind::File), &["/notes/other.md"]);
        assert_eq!(classify_directory_event(&ev, OsStr::new("todo.md")), None);
    }

    #[test]
    fn directory_create_of_target_is_recreation() {
        let ev = event(EventKind::Create(CreateKind::File), &["/notes/todo.md"]);
        assert_eq!(
            classify_directory_event(&ev, OsStr::new("todo.md")),
            Some(Signal::DirectoryChanged { recreated: true })
        );
    }

    #[test]
    fn directory_rename_into_place_is_recreation() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/notes/.todo.md.swp", "/notes/todo.md"],
        );
        assert_eq!(
            classify_directory_event(&ev, OsStr::new("todo.md")),
            Some(Signal::DirectoryChanged { recreated: true })
        );
    }

    #[test]
    fn directory_write_of_target_is_plain_change() {
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &["/notes/todo.md"],
        );
        assert_eq!(
            classify_directory_event(&ev, OsStr::new("todo.md")),
            Some(Signal::DirectoryChanged { recreated: false })
        );
    }

    #[test]
    fn directory_access_is_ignored() {
        let ev = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/notes/todo.md"],
        );
        assert_eq!(classify_directory_event(&ev, OsStr::new("todo.md")), None);
    }

    #[tokio::test]
    async fn arming_missing_file_fails_but_directory_arms() {
        let dir = TempDir::new().unwrap();
        let target = WatchTarget::resolve(&dir.path().join("todo.md")).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let mut session = WatchSession::new(1, target, tx);

        let err = session.arm_file().unwrap_err();
        assert!(matches!(err, MonitorError::WatchSetup { .. }));
        assert!(!session.is_file_armed());

        session.arm_directory().unwrap();
        assert!(session.is_armed());
    }

    #[tokio::test]
    async fn arming_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let target = WatchTarget::resolve(&dir.path().join("missing/todo.md")).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let mut session = WatchSession::new(1, target, tx);

        assert!(session.arm_directory().is_err());
        assert!(!session.is_armed());
    }

    #[tokio::test]
    async fn disarm_file_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("todo.md");
        std::fs::write(&path, "- [ ] a").unwrap();

        let target = WatchTarget::resolve(&path).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let mut session = WatchSession::new(3, target, tx);

        session.arm_file().unwrap();
        session.arm_directory().unwrap();
        assert!(session.is_file_armed());

        session.disarm_file();
        assert!(!session.is_file_armed());
        assert!(session.is_armed());
        assert_eq!(session.generation(), 3);
    }
}
