//! todowatch - live task list watcher.
//!
//! This binary keeps a checklist file's task list on screen as the file is
//! edited.
//!
//! # Commands
//!
//! - `todowatch watch [PATH]`: Watch a file and print the list on every change
//! - `todowatch parse PATH`: Parse a file once and print the sorted list
//! - `todowatch detect`: Print the file auto-detection would pick
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use todowatch_monitor::config::Config;
use todowatch_monitor::discovery::{NoDiscovery, PathDiscovery, TodoFileDiscovery};
use todowatch_monitor::parser::parse_file;
use todowatch_monitor::preferences::JsonPreferenceStore;
use todowatch_monitor::store::TaskSnapshot;
use todowatch_monitor::types::{Priority, TaskRecord, TaskStatus};
use todowatch_monitor::utils::paths::{display_path, expand_tilde};
use todowatch_monitor::watcher::TaskWatcher;

/// todowatch - live task list watcher.
///
/// Watches a markdown checklist file and prints its tasks, sorted with work
/// in progress first, every time the file changes.
#[derive(Parser, Debug)]
#[command(name = "todowatch")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TODOWATCH_FILE               File to watch (overrides the saved path)
    TODOWATCH_AUTO_DETECT        Override the saved auto-detect flag (true/false)
    TODOWATCH_STATE_DIR          Preferences directory (default: ~/.todowatch)
    TODOWATCH_FILE_NAME          File name auto-detection looks for (default: todo.md)
    TODOWATCH_DEBOUNCE_MS        Debounce window (default: 100)
    TODOWATCH_POLL_INTERVAL_MS   Poll fallback period (default: 2000)
    TODOWATCH_LOG_FORMAT         Set to 'json' for JSON logs
    RUST_LOG                     Log filter (default: info)

EXAMPLES:
    # Watch a specific file
    todowatch watch ~/notes/todo.md

    # Watch the saved file, or the newest todo.md under your home directory
    todowatch watch

    # Print a file's tasks as JSON
    todowatch parse ./todo.md --json
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a task file and print the list whenever it changes.
    ///
    /// Without PATH, the saved path or auto-detection decides which file
    /// to watch. A PATH given here is saved for next time.
    Watch {
        /// File to watch.
        path: Option<PathBuf>,

        /// Disable auto-detection and save that choice.
        #[arg(long)]
        no_auto_detect: bool,
    },

    /// Parse a task file once and print the sorted list.
    Parse {
        /// File to parse.
        path: PathBuf,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print the task file auto-detection would pick.
    Detect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Watch {
            path,
            no_auto_detect,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_watch(path, no_auto_detect))
        }
        Command::Parse { path, json } => run_parse(path, json),
        Command::Detect => run_detect(),
    }
}

/// Runs the watch command until Ctrl+C or SIGTERM.
async fn run_watch(path: Option<PathBuf>, no_auto_detect: bool) -> Result<()> {
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        state_dir = %config.state_dir.display(),
        debounce_ms = config.watcher.debounce.as_millis(),
        poll_ms = config.watcher.poll_interval.as_millis(),
        "Configuration loaded"
    );

    let preferences = Arc::new(JsonPreferenceStore::new(&config.state_dir));
    let discovery: Arc<dyn PathDiscovery> = match TodoFileDiscovery::new(&config.discovery_file_name) {
        Some(discovery) => Arc::new(discovery),
        None => Arc::new(NoDiscovery),
    };

    let mut watcher = TaskWatcher::new(config.watcher, preferences, discovery);
    if let Some(enabled) = config.auto_detect {
        watcher = watcher.with_auto_detect(enabled);
    }
    if no_auto_detect {
        watcher.set_auto_detect(false).await;
    }

    // Explicit choices win over saved and detected ones
    match path.or(config.file) {
        Some(path) => watcher
            .start_watching(&path)
            .with_context(|| format!("Cannot watch {}", path.display()))?,
        None => watcher.bootstrap().await,
    }

    let mut changes = watcher.subscribe();
    print_snapshot(&changes.borrow_and_update())?;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                print_snapshot(&snapshot)?;
            }
        }
    }

    watcher.stop_watching();
    debug!(reparses = watcher.reparse_count(), "Watcher stopped");
    Ok(())
}

/// Runs the parse command.
fn run_parse(path: PathBuf, json: bool) -> Result<()> {
    let path = expand_tilde(&path);
    let tasks = parse_file(&path).with_context(|| format!("Cannot parse {}", path.display()))?;

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &tasks).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        for task in &tasks {
            writeln!(out, "{}", format_task(task))?;
        }
    }
    Ok(())
}

/// Runs the detect command.
fn run_detect() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let discovery = TodoFileDiscovery::new(&config.discovery_file_name)
        .context("Failed to determine home directory")?;

    match discovery.discover() {
        Some(path) => println!("{}", path.display()),
        None => anyhow::bail!("No {} found", config.discovery_file_name),
    }
    Ok(())
}

fn print_snapshot(snapshot: &TaskSnapshot) -> Result<()> {
    let mut out = io::stdout().lock();

    let Some(path) = &snapshot.watched_path else {
        writeln!(out, "Not watching any file")?;
        return Ok(());
    };

    let counts = snapshot.counts();
    writeln!(
        out,
        "\n{} ({} in progress, {} pending, {} done, {}%){}",
        display_path(path),
        counts.in_progress,
        counts.pending,
        counts.completed,
        counts.completion_percent(),
        if snapshot.is_watching { "" } else { " [polling]" }
    )?;

    if let Some(error) = &snapshot.last_error {
        writeln!(out, "  ! {error}")?;
    }
    for task in &snapshot.tasks {
        writeln!(out, "  {}", format_task(task))?;
    }
    if let Some(updated) = snapshot.last_updated {
        writeln!(out, "  updated {}", updated.with_timezone(&chrono::Local).format("%H:%M:%S"))?;
    }
    out.flush()?;
    Ok(())
}

fn format_task(task: &TaskRecord) -> String {
    let mark = match task.status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Completed => "[x]",
    };

    match task.priority {
        Priority::Medium => format!("{mark} {}", task.content),
        other => format!("{mark} {} ({})", task.content, other.label()),
    }
}

/// Initializes the logging subsystem.
///
/// Logs go to stderr so stdout carries only the task list.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TODOWATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
