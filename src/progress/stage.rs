use crate::models::{Task, TaskStatus};

/// Aggregation result for one stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRollup {
    pub stage_status_id: i64,
    pub progress: i64,
    pub status: TaskStatus,
}

/// Reduce the tasks assigned to one stage into a progress percentage and a
/// status.
///
/// Progress is the completion ratio: round(100 * completed / total).
///
/// Status precedence, first match wins:
/// 1. all tasks completed -> Completed
/// 2. any task blocked -> Blocked
/// 3. any task in progress, or any task with progress > 0 -> InProgress
/// 4. otherwise -> Pending
///
/// A stage with no tasks has not started: (0, Pending).
pub fn aggregate_stage(tasks: &[&Task]) -> (i64, TaskStatus) {
    let total = tasks.len();
    if total == 0 {
        return (0, TaskStatus::Pending);
    }

    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let progress = ((completed as f64 / total as f64) * 100.0).round() as i64;

    let status = if completed == total {
        TaskStatus::Completed
    } else if tasks.iter().any(|t| t.status == TaskStatus::Blocked) {
        TaskStatus::Blocked
    } else if tasks
        .iter()
        .any(|t| t.status == TaskStatus::InProgress || t.progress > 0)
    {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    };

    (progress, status)
}
