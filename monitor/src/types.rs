//! Task types for todowatch.
//!
//! This module defines the task record produced by the parser and consumed
//! by the store and any presentation layer. All types serialize to camelCase
//! JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task waiting to start.
    #[default]
    Pending,
    /// Task currently being worked on.
    InProgress,
    /// Task finished.
    Completed,
}

impl TaskStatus {
    /// Sort rank: in-progress work first, finished work last.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::InProgress => 0,
            TaskStatus::Pending => 1,
            TaskStatus::Completed => 2,
        }
    }
}

/// Priority of a task. Unmarked tasks are [`Priority::Medium`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: high first.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Short badge text for display.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MED",
            Priority::Low => "LOW",
        }
    }
}

/// A single task parsed from a checklist line.
///
/// Every record gets a fresh synthetic `id` when constructed. The id exists
/// for list diffing in a UI and takes no part in equality: two records parsed
/// from the same line at different times compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Synthetic identity, unique per construction.
    pub id: Uuid,

    /// Display text with all checklist, priority and status markup removed.
    pub content: String,

    /// Final status after status-tag overrides.
    pub status: TaskStatus,

    /// Priority from the first matching marker, or medium.
    pub priority: Priority,

    /// The raw, untrimmed source line.
    pub original_line: String,
}

impl TaskRecord {
    /// Creates a record with a new random identifier.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        status: TaskStatus,
        priority: Priority,
        original_line: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            status,
            priority,
            original_line: original_line.into(),
        }
    }
}

impl PartialEq for TaskRecord {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
            && self.status == other.status
            && self.priority == other.priority
            && self.original_line == other.original_line
    }
}

impl Eq for TaskRecord {}

/// Counts of tasks by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    /// Number of pending tasks.
    pub pending: u32,
    /// Number of in-progress tasks.
    pub in_progress: u32,
    /// Number of completed tasks.
    pub completed: u32,
}

impl TaskCounts {
    /// Tallies a task list.
    ///
    /// # Example
    ///
    /// ```
    /// use todowatch_monitor::parser::parse;
    /// use todowatch_monitor::types::TaskCounts;
    ///
    /// let tasks = parse("- [x] a\n- [~] b\n- [ ] c\n- [ ] d");
    /// let counts = TaskCounts::from_tasks(&tasks);
    ///
    /// assert_eq!(counts.completed, 1);
    /// assert_eq!(counts.in_progress, 1);
    /// assert_eq!(counts.pending, 2);
    /// ```
    #[must_use]
    pub fn from_tasks(tasks: &[TaskRecord]) -> Self {
        let mut counts = Self::default();

        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
            }
        }

        counts
    }

    /// Returns the total number of tasks.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.pending + self.in_progress + self.completed
    }

    /// Returns true if any task is pending or in progress.
    #[must_use]
    pub fn has_incomplete(&self) -> bool {
        self.in_progress > 0 || self.pending > 0
    }

    /// Completed share of all tasks, 0-100. An empty list reports 0.
    #[must_use]
    pub fn completion_percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        // completed <= total, so the result is at most 100
        (u64::from(self.completed) * 100 / u64::from(total)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rank_orders_in_progress_first() {
        assert!(TaskStatus::InProgress.rank() < TaskStatus::Pending.rank());
        assert!(TaskStatus::Pending.rank() < TaskStatus::Completed.rank());
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn defaults_match_unmarked_lines() {
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn status_serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"completed\"").unwrap(),
            TaskStatus::Completed
        );
    }

    #[test]
    fn record_equality_ignores_id() {
        let a = TaskRecord::new("Fix bug", TaskStatus::Pending, Priority::High, "- [ ] Fix bug");
        let b = TaskRecord::new("Fix bug", TaskStatus::Pending, Priority::High, "- [ ] Fix bug");

        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[test]
    fn record_equality_compares_original_line() {
        let a = TaskRecord::new("Fix bug", TaskStatus::Pending, Priority::High, "- [ ] Fix bug");
        let b = TaskRecord::new("Fix bug", TaskStatus::Pending, Priority::High, "* [ ] Fix bug");

        assert_ne!(a, b);
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = TaskRecord::new("Ship", TaskStatus::InProgress, Priority::Low, "- [~] Ship");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["content"], "Ship");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["priority"], "low");
        assert_eq!(json["originalLine"], "- [~] Ship");
        assert!(json.get("id").is_some());
    }

    #[test]
    fn counts_total_and_incomplete() {
        let counts = TaskCounts {
            pending: 3,
            in_progress: 1,
            completed: 2,
        };
        assert_eq!(counts.total(), 6);
        assert!(counts.has_incomplete());

        let done = TaskCounts {
            pending: 0,
            in_progress: 0,
            completed: 4,
        };
        assert!(!done.has_incomplete());
    }

    #[test]
    fn completion_percent_handles_empty_list() {
        assert_eq!(TaskCounts::default().completion_percent(), 0);

        let counts = TaskCounts {
            pending: 1,
            in_progress: 1,
            completed: 2,
        };
        assert_eq!(counts.completion_percent(), 50);
    }
}
