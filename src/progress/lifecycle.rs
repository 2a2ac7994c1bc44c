use crate::models::{FlowState, StageStatus, Task, TaskStatus};
use crate::progress::StageRollup;

/// Classify a flow instance into its coarse lifecycle state.
///
/// Rules in order:
/// 1. stages exist and every stage is completed (or at 100) -> Completed
/// 2. nothing active and nothing started anywhere -> NotStarted
/// 3. otherwise -> InProgress
///
/// When the task list is available (write path) the active/started signals
/// come from the tasks themselves; otherwise (read path over persisted
/// summaries) they come from the stage rollups. Both views agree for the
/// same underlying task data, since the rollups are derived from the tasks.
pub fn classify(stages: &[StageRollup], tasks: Option<&[Task]>) -> FlowState {
    let all_completed = !stages.is_empty()
        && stages
            .iter()
            .all(|s| s.status == TaskStatus::Completed || s.progress == 100);
    if all_completed {
        return FlowState::Completed;
    }

    let (any_active, any_started) = match tasks {
        Some(tasks) => (
            tasks.iter().any(|t| t.status.is_active()),
            tasks
                .iter()
                .any(|t| t.status == TaskStatus::Completed || t.progress > 0),
        ),
        None => (
            stages.iter().any(|s| s.status.is_active()),
            stages
                .iter()
                .any(|s| s.progress > 0 || s.status == TaskStatus::Completed),
        ),
    };

    if !any_active && !any_started {
        FlowState::NotStarted
    } else {
        FlowState::InProgress
    }
}

/// Read-path classification from already-persisted stage summaries,
/// without refetching tasks.
pub fn classify_persisted(stage_statuses: &[StageStatus]) -> FlowState {
    let rollups: Vec<StageRollup> = stage_statuses
        .iter()
        .map(|ss| StageRollup {
            stage_status_id: ss.id.unwrap_or_default(),
            progress: ss.progress,
            status: ss.status,
        })
        .collect();
    classify(&rollups, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollup(progress: i64, status: TaskStatus) -> StageRollup {
        StageRollup {
            stage_status_id: 1,
            progress,
            status,
        }
    }

    fn task(status: TaskStatus, progress: i64) -> Task {
        let mut task = Task::new("t".to_string(), 1);
        task.status = status;
        task.progress = progress;
        task
    }

    #[test]
    fn test_no_stages_is_not_started() {
        assert_eq!(classify(&[], None), FlowState::NotStarted);
        assert_eq!(classify(&[], Some(&[])), FlowState::NotStarted);
    }

    #[test]
    fn test_all_stages_completed() {
        let stages = vec![
            rollup(100, TaskStatus::Completed),
            rollup(100, TaskStatus::Completed),
        ];
        assert_eq!(classify(&stages, None), FlowState::Completed);
    }

    #[test]
    fn test_stage_at_100_counts_as_completed() {
        // An overridden stage at full progress closes the flow even if its
        // status string lags behind
        let stages = vec![rollup(100, TaskStatus::InProgress)];
        assert_eq!(classify(&stages, None), FlowState::Completed);
    }

    #[test]
    fn test_untouched_flow_not_started() {
        let stages = vec![rollup(0, TaskStatus::Pending)];
        let tasks = vec![task(TaskStatus::Pending, 0)];
        assert_eq!(classify(&stages, Some(&tasks)), FlowState::NotStarted);
        assert_eq!(classify(&stages, None), FlowState::NotStarted);
    }

    #[test]
    fn test_active_task_means_in_progress() {
        let stages = vec![rollup(0, TaskStatus::Pending)];
        for status in [TaskStatus::InProgress, TaskStatus::Blocked, TaskStatus::Returned] {
            let tasks = vec![task(status, 0)];
            assert_eq!(classify(&stages, Some(&tasks)), FlowState::InProgress);
        }
    }

    #[test]
    fn test_partial_completion_means_in_progress() {
        let stages = vec![
            rollup(100, TaskStatus::Completed),
            rollup(0, TaskStatus::Pending),
        ];
        let tasks = vec![task(TaskStatus::Completed, 100), task(TaskStatus::Pending, 0)];
        assert_eq!(classify(&stages, Some(&tasks)), FlowState::InProgress);
    }

    #[test]
    fn test_task_progress_alone_means_in_progress() {
        let stages = vec![rollup(0, TaskStatus::Pending)];
        let tasks = vec![task(TaskStatus::Pending, 10)];
        assert_eq!(classify(&stages, Some(&tasks)), FlowState::InProgress);
    }

    #[test]
    fn test_read_and_write_paths_agree() {
        // Same underlying data, classified with and without the task list
        let stages = vec![
            rollup(50, TaskStatus::InProgress),
            rollup(0, TaskStatus::Pending),
        ];
        let tasks = vec![
            task(TaskStatus::Completed, 100),
            task(TaskStatus::InProgress, 0),
            task(TaskStatus::Pending, 0),
        ];
        assert_eq!(classify(&stages, Some(&tasks)), classify(&stages, None));
    }

    #[test]
    fn test_classify_persisted() {
        let mut ss = StageStatus::new(1, 1);
        ss.id = Some(1);
        ss.progress = 100;
        ss.status = TaskStatus::Completed;
        assert_eq!(classify_persisted(&[ss]), FlowState::Completed);

        let untouched = StageStatus::new(1, 2);
        assert_eq!(classify_persisted(&[untouched]), FlowState::NotStarted);

        assert_eq!(classify_persisted(&[]), FlowState::NotStarted);
    }
}
