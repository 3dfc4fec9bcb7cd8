//! Fixed-period poll fallback.
//!
//! Native file events can be dropped, coalesced away or simply unsupported
//! (network mounts, some container filesystems). The poll fallback asks for
//! a re-parse of the watched path on every tick regardless of session
//! state. The store's value-equality check turns redundant polls into
//! no-ops, so subscribers only hear about real changes.

use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::store::TaskStore;

/// Default poll period in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Periodic re-parse trigger.
#[derive(Debug, Clone, Copy)]
pub struct PollFallback {
    period: Duration,
}

impl Default for PollFallback {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl PollFallback {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawns the poll loop.
    ///
    /// On each tick, if the store has a watched path, `trigger` is called
    /// with that path and the current session generation. Nothing happens
    /// on ticks where no path is set. The loop runs until the returned
    /// handle is aborted.
    pub fn spawn<F>(self, store: TaskStore, trigger: F) -> JoinHandle<()>
    where
        F: Fn(&Path, u64) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick completes immediately; start_watching already
            // did the initial parse.
            ticker.tick().await;

            debug!(period_ms = self.period.as_millis(), "Starting poll fallback");

            loop {
                ticker.tick().await;

                let (path, generation) = store.watch_target();

                if let Some(path) = path {
                    trace!(path = %path.display(), generation, "Poll tick");
                    trigger(&path, generation);
                }
            }
        })
    }
}
