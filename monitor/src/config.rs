//! Configuration module for todowatch.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TODOWATCH_FILE` | No | - | File to watch, overriding the saved path |
//! | `TODOWATCH_AUTO_DETECT` | No | (preferences) | `true`/`false`, overrides the saved flag |
//! | `TODOWATCH_STATE_DIR` | No | `~/.todowatch` | Directory holding `preferences.json` |
//! | `TODOWATCH_FILE_NAME` | No | `todo.md` | File name auto-detection searches for |
//! | `TODOWATCH_DEBOUNCE_MS` | No | 100 | Quiescence window (1-5000) |
//! | `TODOWATCH_POLL_INTERVAL_MS` | No | 2000 | Poll fallback period |
//! | `TODOWATCH_GRACE_MS` | No | 500 | Wait after delete/rename before probing |
//! | `TODOWATCH_RECREATE_DELAY_MS` | No | 100 | Wait after a directory event before re-parsing |
//!
//! # Example
//!
//! ```no_run
//! use todowatch_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("State directory: {}", config.state_dir.display());
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

use crate::discovery::DEFAULT_FILE_NAME;
use crate::poll::DEFAULT_POLL_INTERVAL_MS;
use crate::utils::debounce::DEFAULT_DEBOUNCE_MS;
use crate::utils::paths::expand_tilde;

/// Default state directory name relative to home.
const DEFAULT_STATE_DIR: &str = ".todowatch";

/// Default grace period after a delete/rename (in milliseconds).
pub const DEFAULT_GRACE_MS: u64 = 500;

/// Default delay before acting on a directory event (in milliseconds).
pub const DEFAULT_RECREATE_DELAY_MS: u64 = 100;

/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 1;

/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 5000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Timings for the watch-and-reconcile loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Quiescence window before a burst of signals becomes one re-parse.
    pub debounce: Duration,

    /// Poll fallback period.
    pub poll_interval: Duration,

    /// Wait after the file is deleted or renamed before probing for it.
    pub grace_period: Duration,

    /// Wait after a directory event before re-arming and re-parsing.
    pub recreate_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            grace_period: Duration::from_millis(DEFAULT_GRACE_MS),
            recreate_delay: Duration::from_millis(DEFAULT_RECREATE_DELAY_MS),
        }
    }
}

/// Configuration for todowatch.
#[derive(Debug, Clone)]
pub struct Config {
    /// File to watch instead of the saved or discovered one.
    pub file: Option<PathBuf>,

    /// Auto-detect override. `None` defers to saved preferences.
    pub auto_detect: Option<bool>,

    /// Directory holding persisted preferences.
    pub state_dir: PathBuf,

    /// File name the discovery heuristic looks for.
    pub discovery_file_name: String,

    /// Watch loop timings.
    pub watcher: WatcherConfig,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A numeric variable is set but is not a valid value in its range
    /// - `TODOWATCH_AUTO_DETECT` is set but is not a recognised boolean
    /// - The home directory cannot be determined (needed for default paths)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        let home_dir = base_dirs.home_dir();

        // Optional: TODOWATCH_FILE
        let file = env::var("TODOWATCH_FILE")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .map(|val| expand_tilde(Path::new(val.trim())));

        // Optional: TODOWATCH_AUTO_DETECT
        let auto_detect = match env::var("TODOWATCH_AUTO_DETECT") {
            Ok(val) => Some(parse_bool("TODOWATCH_AUTO_DETECT", &val)?),
            Err(_) => None,
        };

        // Optional: TODOWATCH_STATE_DIR (default: ~/.todowatch)
        let state_dir = env::var("TODOWATCH_STATE_DIR")
            .map(|val| expand_tilde(Path::new(&val)))
            .unwrap_or_else(|_| home_dir.join(DEFAULT_STATE_DIR));

        // Optional: TODOWATCH_FILE_NAME (default: todo.md)
        let discovery_file_name = match env::var("TODOWATCH_FILE_NAME") {
            Ok(val) => {
                let name = val.trim();
                if name.is_empty() || name.contains(std::path::MAIN_SEPARATOR) {
                    return Err(ConfigError::InvalidValue {
                        key: "TODOWATCH_FILE_NAME".to_string(),
                        message: format!("expected a bare file name, got '{val}'"),
                    });
                }
                name.to_string()
            }
            Err(_) => DEFAULT_FILE_NAME.to_string(),
        };

        // Optional: TODOWATCH_DEBOUNCE_MS (default: 100, must be 1-5000)
        let debounce_ms = parse_millis("TODOWATCH_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        if !(MIN_DEBOUNCE_MS..=MAX_DEBOUNCE_MS).contains(&debounce_ms) {
            return Err(ConfigError::InvalidValue {
                key: "TODOWATCH_DEBOUNCE_MS".to_string(),
                message: format!(
                    "debounce must be between {MIN_DEBOUNCE_MS} and {MAX_DEBOUNCE_MS} ms, got {debounce_ms}"
                ),
            });
        }

        // Optional: TODOWATCH_POLL_INTERVAL_MS (default: 2000, must be > 0)
        let poll_ms = parse_millis("TODOWATCH_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TODOWATCH_POLL_INTERVAL_MS".to_string(),
                message: "poll interval must be greater than 0".to_string(),
            });
        }

        // Poll requests share the debounce window, so a shorter period would
        // keep pushing the deadline back
        if poll_ms <= debounce_ms {
            return Err(ConfigError::InvalidValue {
                key: "TODOWATCH_POLL_INTERVAL_MS".to_string(),
                message: format!(
                    "poll interval ({poll_ms} ms) must be longer than the debounce window ({debounce_ms} ms)"
                ),
            });
        }

        let grace_ms = parse_millis("TODOWATCH_GRACE_MS", DEFAULT_GRACE_MS)?;
        let recreate_ms = parse_millis("TODOWATCH_RECREATE_DELAY_MS", DEFAULT_RECREATE_DELAY_MS)?;

        Ok(Self {
            file,
            auto_detect,
            state_dir,
            discovery_file_name,
            watcher: WatcherConfig {
                debounce: Duration::from_millis(debounce_ms),
                poll_interval: Duration::from_millis(poll_ms),
                grace_period: Duration::from_millis(grace_ms),
                recreate_delay: Duration::from_millis(recreate_ms),
            },
        })
    }
}

/// Reads a millisecond value, falling back to `default` when unset.
fn parse_millis(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected non-negative integer, got '{val}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got '{val}'"),
        }),
    }
}
