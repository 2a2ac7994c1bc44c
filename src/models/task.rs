use serde::{Deserialize, Serialize};

/// Task status
///
/// State model:
/// - Pending: created, nobody has picked it up
/// - InProgress: actively being worked
/// - Blocked: cannot proceed until something external clears
/// - Returned: sent back to its owner for rework
/// - Completed: done (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Returned,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Returned => "returned",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "blocked" => Some(TaskStatus::Blocked),
            "returned" => Some(TaskStatus::Returned),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Statuses that count as "someone is touching this" when classifying a
    /// flow's lifecycle. Returned tasks are active: they need rework.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Blocked | Self::Returned)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Clamp a progress value into the 0-100 range.
/// Out-of-range operator input is clamped, never rejected.
pub fn clamp_progress(progress: i64) -> i64 {
    progress.clamp(0, 100)
}

/// Task model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub uuid: String,
    pub title: String,
    pub status: TaskStatus,
    pub progress: i64,
    pub deadline_ts: Option<i64>,
    pub flow_instance_id: i64,
    pub stage_status_id: Option<i64>,
    pub owner: Option<String>,
    pub created_ts: i64,
    pub modified_ts: i64,
}

impl Task {
    /// Create a new pending task under a flow instance
    pub fn new(title: String, flow_instance_id: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            uuid: uuid::Uuid::new_v4().to_string(),
            title,
            status: TaskStatus::Pending,
            progress: 0,
            deadline_ts: None,
            flow_instance_id,
            stage_status_id: None,
            owner: None,
            created_ts: now,
            modified_ts: now,
        }
    }

    /// Check if the task's deadline is in the past relative to `now`.
    /// Completed tasks are never overdue.
    pub fn is_overdue(&self, now: i64) -> bool {
        if self.status == TaskStatus::Completed {
            return false;
        }
        match self.deadline_ts {
            Some(deadline) => deadline < now,
            None => false,
        }
    }
}
