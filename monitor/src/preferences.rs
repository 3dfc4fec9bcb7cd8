//! Persisted user preferences.
//!
//! Two values survive restarts: the last file the user chose to watch and
//! whether auto-detection is enabled. The watcher reads them once at
//! bootstrap and writes them back when the user changes either one.
//!
//! [`JsonPreferenceStore`] keeps them in `<state_dir>/preferences.json`:
//!
//! ```json
//! {
//!   "savedPath": "/home/user/notes/todo.md",
//!   "autoDetect": false
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// File name of the preference file inside the state directory.
pub const PREFERENCES_FILE: &str = "preferences.json";

/// The persisted preference values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Last path the user explicitly chose.
    pub saved_path: Option<PathBuf>,
    /// Whether to pick a file automatically at start-up.
    pub auto_detect: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            saved_path: None,
            auto_detect: true,
        }
    }
}

/// Storage backend for [`Preferences`].
pub trait PreferenceStore: Send + Sync {
    /// Loads the stored preferences, falling back to defaults.
    fn load(&self) -> Preferences;

    /// Persists the saved path.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save_path(&self, path: &Path) -> Result<()>;

    /// Persists the auto-detect flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save_auto_detect(&self, enabled: bool) -> Result<()>;
}

/// Preferences stored as JSON in a state directory.
#[derive(Debug)]
pub struct JsonPreferenceStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonPreferenceStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the path of the preference file.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(PREFERENCES_FILE)
    }

    fn read(&self) -> Preferences {
        let path = self.file_path();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Preferences::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read preferences, using defaults");
                return Preferences::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Preferences file is corrupted, using defaults");
                Preferences::default()
            }
        }
    }

    fn write(&self, prefs: &Preferences) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let temp_path = self.dir.join(format!("{PREFERENCES_FILE}.tmp"));
        let json = serde_json::to_string_pretty(prefs)?;
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, self.file_path())?;

        debug!(path = %self.file_path().display(), "Saved preferences");
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<()> {
        let _guard = self.lock.lock();
        let mut prefs = self.read();
        apply(&mut prefs);
        self.write(&prefs)
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> Preferences {
        let _guard = self.lock.lock();
        self.read()
    }

    fn save_path(&self, path: &Path) -> Result<()> {
        self.update(|prefs| prefs.saved_path = Some(path.to_path_buf()))
    }

    fn save_auto_detect(&self, enabled: bool) -> Result<()> {
        self.update(|prefs| prefs.auto_detect = enabled)
    }
}

/// In-process preferences that are never written anywhere.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    prefs: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    #[must_use]
    pub fn new(prefs: Preferences) -> Self {
        Self {
            prefs: Mutex::new(prefs),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Preferences {
        self.prefs.lock().clone()
    }

    fn save_path(&self, path: &Path) -> Result<()> {
        self.prefs.lock().saved_path = Some(path.to_path_buf());
        Ok(())
    }

    fn save_auto_detect(&self, enabled: bool) -> Result<()> {
        self.prefs.lock().auto_detect = enabled;
        Ok(())
    }
}
