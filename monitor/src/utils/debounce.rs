//! Debounce utility for coalescing re-parse requests.
//!
//! Every trigger source (file events, directory events, the poll fallback)
//! asks for a re-parse of the watched path. Editors often produce a storm of
//! events for a single save, so requests are held until the path has been
//! quiet for the debounce interval and only the last one is emitted.
//!
//! # Architecture
//!
//! The debouncer runs a background task that keeps a map of pending requests
//! keyed by a caller-defined key (the watched path). When a request arrives:
//!
//! 1. It replaces any pending request for the same key
//! 2. The key's deadline is pushed back by the interval
//! 3. Once the deadline passes with no new request, the final value is emitted
//!
//! [`Debouncer::clear`] drops everything pending, so a torn-down watch
//! session cannot fire a trailing re-parse.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use todowatch_monitor::utils::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(100);
//!     let debouncer = Debouncer::new(Duration::from_millis(100), output_tx);
//!
//!     // Three signals for the same file, tagged with a session generation
//!     let path = PathBuf::from("/notes/todo.md");
//!     debouncer.send(path.clone(), 1_u64).await.unwrap();
//!     debouncer.send(path.clone(), 1_u64).await.unwrap();
//!     debouncer.send(path.clone(), 2_u64).await.unwrap();
//!
//!     // After the quiet period, a single request carrying the last value
//!     if let Some((key, generation)) = output_rx.recv().await {
//!         assert_eq!(key, path);
//!         assert_eq!(generation, 2);
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Capacity of the input queue feeding the background task.
const INPUT_CAPACITY: usize = 1000;

/// Error type for debouncer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebouncerError {
    /// The debouncer's input channel has been closed.
    #[error("debouncer channel closed")]
    ChannelClosed,
}

/// Messages accepted by the background task.
#[derive(Debug)]
enum Command<K, V> {
    Signal(K, V),
    Clear,
}

/// A pending request waiting for its deadline.
#[derive(Debug)]
struct PendingEvent<V> {
    /// The value to emit when the deadline passes.
    value: V,
    /// When this request should be emitted.
    deadline: Instant,
}

/// A trailing-edge debouncer keyed by `K`.
///
/// # Type Parameters
///
/// * `K` - The key requests are grouped by (the watched path)
/// * `V` - The value carried with each request (the session generation)
///
/// # Thread Safety
///
/// All state lives in a background Tokio task. [`try_send`](Self::try_send)
/// and [`clear`](Self::clear) never block, so they are safe to call from a
/// notify callback thread.
#[derive(Debug)]
pub struct Debouncer<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Channel for sending commands to the background task.
    input_tx: mpsc::Sender<Command<K, V>>,
    /// Handle to the background task.
    #[allow(dead_code)]
    task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V> Debouncer<K, V>
where
    K: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
    V: Clone + Send + 'static,
{
    /// Creates a new debouncer with the specified interval.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `interval` - How long a key must stay quiet before it is emitted
    /// * `output_tx` - Channel receiving `(key, value)` once per burst
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<(K, V)>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        let task_handle = tokio::spawn(async move {
            run_debounce_loop(interval, input_rx, output_tx).await;
        });

        Self {
            input_tx,
            task_handle,
        }
    }

    /// Creates a new debouncer with the default interval (100ms).
    #[must_use]
    pub fn with_default_interval(output_tx: mpsc::Sender<(K, V)>) -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS), output_tx)
    }

    /// Queues a request, waiting for channel capacity if needed.
    ///
    /// # Errors
    ///
    /// Returns `DebouncerError::ChannelClosed` if the background task has
    /// terminated.
    pub async fn send(&self, key: K, value: V) -> Result<(), DebouncerError> {
        self.input_tx
            .send(Command::Signal(key, value))
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }

    /// Queues a request without waiting.
    ///
    /// Returns `false` if the channel is full or closed.
    pub fn try_send(&self, key: K, value: V) -> bool {
        self.input_tx.try_send(Command::Signal(key, value)).is_ok()
    }

    /// Drops every pending request without emitting it.
    ///
    /// Requests queued after this call are unaffected. Returns `false` if the
    /// command could not be queued.
    pub fn clear(&self) -> bool {
        self.input_tx.try_send(Command::Clear).is_ok()
    }
}

/// Runs the debounce loop, processing commands and emitting expired requests.
async fn run_debounce_loop<K, V>(
    interval: Duration,
    mut input_rx: mpsc::Receiver<Command<K, V>>,
    output_tx: mpsc::Sender<(K, V)>,
) where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    let mut pending: HashMap<K, PendingEvent<V>> = HashMap::new();

    // Idle wake-up when nothing is pending
    let tick_interval = std::cmp::min(interval / 4, Duration::from_millis(25));

    debug!(
        interval_ms = interval.as_millis(),
        tick_ms = tick_interval.as_millis(),
        "Starting debounce loop"
    );

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            command = input_rx.recv() => {
                match command {
                    Some(Command::Signal(key, value)) => {
                        let deadline = Instant::now() + interval;
                        trace!(key = ?key, "Received signal, setting deadline");
                        pending.insert(key, PendingEvent { value, deadline });
                    }
                    Some(Command::Clear) => {
                        if !pending.is_empty() {
                            debug!(dropped = pending.len(), "Clearing pending requests");
                        }
                        pending.clear();
                    }
                    None => {
                        debug!("Input channel closed, flushing remaining requests");
                        flush_all_pending(&mut pending, &output_tx).await;
                        break;
                    }
                }
            }

            _ = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => tokio::time::sleep(tick_interval).await,
                }
            } => {
                emit_expired_events(&mut pending, &output_tx).await;
            }
        }
    }

    debug!("Debounce loop terminated");
}

/// Emits all requests whose deadlines have passed.
async fn emit_expired_events<K, V>(
    pending: &mut HashMap<K, PendingEvent<V>>,
    output_tx: &mpsc::Sender<(K, V)>,
) where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    let now = Instant::now();

    let expired_keys: Vec<K> = pending
        .iter()
        .filter(|(_, event)| event.deadline <= now)
        .map(|(key, _)| key.clone())
        .collect();

    for key in expired_keys {
        if let Some(event) = pending.remove(&key) {
            trace!(key = ?key, "Emitting debounced request");
            if let Err(e) = output_tx.send((key.clone(), event.value)).await {
                warn!(key = ?key, error = %e, "Failed to emit debounced request");
            }
        }
    }
}

/// Flushes all pending requests immediately, regardless of their deadlines.
async fn flush_all_pending<K, V>(
    pending: &mut HashMap<K, PendingEvent<V>>,
    output_tx: &mpsc::Sender<(K, V)>,
) where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    for (key, event) in pending.drain() {
        trace!(key = ?key, "Flushing pending request");
        if let Err(e) = output_tx.send((key.clone(), event.value)).await {
            warn!(key = ?key, error = %e, "Failed to flush pending request");
        }
    }
}
