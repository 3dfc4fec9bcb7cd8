//! Utility modules for the todowatch monitor.
//!
//! # Modules
//!
//! - [`debounce`]: Keyed trailing-edge debouncing for re-parse requests
//! - [`paths`]: Tilde expansion, watch target resolution and display paths

pub mod debounce;
pub mod paths;

pub use debounce::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
pub use paths::{display_path, expand_tilde, WatchTarget};
