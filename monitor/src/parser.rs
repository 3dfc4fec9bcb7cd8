//! Checklist parser for todowatch.
//!
//! Turns the text of a task file into an ordered list of [`TaskRecord`]s.
//! The parser is a pure function: the same text always yields a value-equal
//! list, which lets the store drop redundant re-parses.
//!
//! # Recognized Lines
//!
//! | Prefix | Status |
//! |--------|--------|
//! | `- [ ]`, `* [ ]` | pending |
//! | `- [x]`, `- [X]`, `* [x]`, `* [X]` | completed |
//! | `- [~]`, `- [/]`, `* [~]`, `* [/]` | in progress |
//! | `- `, `* ` | pending |
//! | `1. `, `23.  ` | pending |
//!
//! Anything else is not a task and is skipped.
//!
//! # Markers
//!
//! Priority markers (`[HIGH]`, `🔴`, `!!!`, `[low]`, `🟢`, `[MED]`, ...) and
//! status tags (`(done)`, `(in progress)`, `(todo)`, ...) are looked up in a
//! fixed precedence order. The first entry in the table that occurs anywhere
//! in the line wins, regardless of where in the line it sits. A status tag
//! overrides the status implied by the checkbox.
//!
//! # Example
//!
//! ```
//! use todowatch_monitor::parser::parse;
//! use todowatch_monitor::types::{Priority, TaskStatus};
//!
//! let tasks = parse("# Sprint\n- [ ] Fix bug [HIGH]\n- [x] Write docs");
//!
//! assert_eq!(tasks.len(), 2);
//! assert_eq!(tasks[0].content, "Fix bug");
//! assert_eq!(tasks[0].priority, Priority::High);
//! assert_eq!(tasks[1].status, TaskStatus::Completed);
//! ```

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MonitorError, Result};
use crate::types::{Priority, TaskRecord, TaskStatus};

/// Length of every checkbox prefix such as `- [x]`.
const CHECKBOX_PREFIX_LEN: usize = 5;

const PENDING_PREFIXES: [&str; 2] = ["- [ ]", "* [ ]"];

const COMPLETED_PREFIXES: [&str; 4] = ["- [x]", "- [X]", "* [x]", "* [X]"];

const IN_PROGRESS_PREFIXES: [&str; 4] = ["- [~]", "- [/]", "* [~]", "* [/]"];

const BULLET_PREFIXES: [&str; 2] = ["- ", "* "];

/// Priority markers in precedence order.
const PRIORITY_MARKERS: [(&str, Priority); 11] = [
    ("[HIGH]", Priority::High),
    ("[high]", Priority::High),
    ("\u{1F534}", Priority::High),
    ("!!!", Priority::High),
    ("\u{2757}\u{FE0F}", Priority::High),
    ("[LOW]", Priority::Low),
    ("[low]", Priority::Low),
    ("\u{1F7E2}", Priority::Low),
    ("[MED]", Priority::Medium),
    ("[med]", Priority::Medium),
    ("\u{1F7E1}", Priority::Medium),
];

/// Status tags in precedence order, matched case-insensitively.
const STATUS_TAGS: [(&str, TaskStatus); 8] = [
    ("(in_progress)", TaskStatus::InProgress),
    ("(in progress)", TaskStatus::InProgress),
    ("(active)", TaskStatus::InProgress),
    ("(completed)", TaskStatus::Completed),
    ("(done)", TaskStatus::Completed),
    ("(finished)", TaskStatus::Completed),
    ("(pending)", TaskStatus::Pending),
    ("(todo)", TaskStatus::Pending),
];

/// Every character that ends a line, including the Unicode separators.
const LINE_BREAKS: [char; 7] = [
    '\n', '\u{0B}', '\u{0C}', '\r', '\u{85}', '\u{2028}', '\u{2029}',
];

static NUMBERED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+").expect("numbered-list pattern is valid"));

/// Parses checklist text into a sorted task list.
///
/// Tasks are ordered by status (in progress, pending, completed) and then by
/// priority (high, medium, low). The sort is stable, so tasks that tie keep
/// the order they had in the file.
#[must_use]
pub fn parse(text: &str) -> Vec<TaskRecord> {
    let mut tasks: Vec<TaskRecord> = text
        .split(LINE_BREAKS)
        .filter_map(parse_line)
        .collect();

    tasks.sort_by_key(|task| (task.status.rank(), task.priority.rank()));
    tasks
}

/// Reads and parses a task file.
///
/// # Errors
///
/// Returns [`MonitorError::Read`] if the file cannot be read as UTF-8 text.
pub fn parse_file(path: &Path) -> Result<Vec<TaskRecord>> {
    let text = std::fs::read_to_string(path).map_err(|source| MonitorError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(parse(&text))
}

/// Parses one line, returning `None` for anything that is not a task.
fn parse_line(line: &str) -> Option<TaskRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (mut status, rest) = strip_list_prefix(trimmed)?;
    let mut content = rest.to_string();

    let mut priority = Priority::default();
    if let Some((marker, marked)) = PRIORITY_MARKERS
        .iter()
        .find(|(marker, _)| content.contains(marker))
    {
        priority = *marked;
        remove_first(&mut content, marker);
    }

    // ASCII folding keeps byte offsets identical between the folded copy and
    // the original, so a match position in one is valid in the other.
    let folded = content.to_ascii_lowercase();
    if let Some((start, tag, tagged)) = STATUS_TAGS
        .iter()
        .find_map(|(tag, tagged)| folded.find(tag).map(|start| (start, tag, tagged)))
    {
        status = *tagged;
        content.replace_range(start..start + tag.len(), "");
    }

    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    Some(TaskRecord::new(content, status, priority, line))
}

/// Strips a checkbox, bullet or numbered-list prefix.
fn strip_list_prefix(trimmed: &str) -> Option<(TaskStatus, &str)> {
    let checkbox = if PENDING_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        Some(TaskStatus::Pending)
    } else if COMPLETED_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        Some(TaskStatus::Completed)
    } else if IN_PROGRESS_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        Some(TaskStatus::InProgress)
    } else {
        None
    };

    if let Some(status) = checkbox {
        return Some((status, trimmed[CHECKBOX_PREFIX_LEN..].trim()));
    }

    if let Some(rest) = BULLET_PREFIXES.iter().find_map(|p| trimmed.strip_prefix(p)) {
        return Some((TaskStatus::Pending, rest));
    }

    NUMBERED_PREFIX
        .find(trimmed)
        .map(|m| (TaskStatus::Pending, &trimmed[m.end()..]))
}

fn remove_first(content: &mut String, needle: &str) {
    if let Some(start) = content.find(needle) {
        content.replace_range(start..start + needle.len(), "");
    }
}
