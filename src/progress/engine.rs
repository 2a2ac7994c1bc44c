use crate::models::{FlowHealth, FlowInstance, FlowState, Task};
use crate::progress::{aggregate_flow, aggregate_stage, classify, FlowStore, StageRollup, StoreError};

/// How often a recompute is re-run when a concurrent writer wins the
/// revision race before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// What a recompute returns to its caller
#[derive(Debug, Clone)]
pub struct RecomputeResult {
    pub flow: FlowInstance,
    pub state: FlowState,
}

/// Recompute a flow instance: read the task/stage snapshot, aggregate each
/// stage, aggregate the flow, classify the lifecycle, persist, return.
///
/// The evaluation timestamp is captured once here so every deadline check in
/// the pass sees the same instant.
pub fn recompute_flow<S: FlowStore>(
    store: &mut S,
    instance_id: i64,
) -> Result<RecomputeResult, StoreError> {
    recompute_flow_at(store, instance_id, chrono::Utc::now().timestamp())
}

/// Recompute against an explicit evaluation timestamp.
///
/// Retries the whole read-compute-write pass when the flow-level save loses
/// the revision race; each attempt starts from a fresh snapshot, so a retry
/// folds the concurrent writer's data in rather than clobbering it.
pub fn recompute_flow_at<S: FlowStore>(
    store: &mut S,
    instance_id: i64,
    now: i64,
) -> Result<RecomputeResult, StoreError> {
    let mut attempt = 1;
    loop {
        match recompute_once(store, instance_id, now) {
            Err(StoreError::Conflict(id)) if attempt < MAX_ATTEMPTS => {
                log::debug!(
                    "revision conflict on flow instance {}, retrying (attempt {})",
                    id,
                    attempt
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn recompute_once<S: FlowStore>(
    store: &mut S,
    instance_id: i64,
    now: i64,
) -> Result<RecomputeResult, StoreError> {
    let flow = store.load_flow_instance(instance_id)?;
    let stage_statuses = store.load_stage_statuses(instance_id)?;
    let tasks = store.load_tasks(instance_id)?;

    // A flow with no stages degrades to the empty defaults
    if stage_statuses.is_empty() {
        store.save_flow_instance(instance_id, flow.revision, 0, FlowHealth::OnTrack)?;
        return Ok(RecomputeResult {
            flow: FlowInstance {
                progress: 0,
                health: FlowHealth::OnTrack,
                revision: flow.revision + 1,
                ..flow
            },
            state: FlowState::NotStarted,
        });
    }

    let mut rollups = Vec::with_capacity(stage_statuses.len());
    for stage_status in &stage_statuses {
        let id = match stage_status.id {
            Some(id) => id,
            None => continue,
        };
        let stage_tasks: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.stage_status_id == Some(id))
            .collect();
        let (progress, status) = aggregate_stage(&stage_tasks);
        rollups.push(StageRollup {
            stage_status_id: id,
            progress,
            status,
        });
    }

    for rollup in &rollups {
        store.save_stage_status(rollup.stage_status_id, rollup.progress, rollup.status)?;
    }

    let flow_rollup = aggregate_flow(&rollups, &tasks, now);
    let state = classify(&rollups, Some(&tasks));

    store.save_flow_instance(
        instance_id,
        flow.revision,
        flow_rollup.progress,
        flow_rollup.health,
    )?;

    log::debug!(
        "recomputed flow instance {}: progress={} health={} state={}",
        instance_id,
        flow_rollup.progress,
        flow_rollup.health.as_str(),
        state.as_str()
    );

    Ok(RecomputeResult {
        flow: FlowInstance {
            progress: flow_rollup.progress,
            health: flow_rollup.health,
            revision: flow.revision + 1,
            ..flow
        },
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StageStatus, TaskStatus};
    use std::collections::HashMap;

    /// In-memory store fake for deterministic engine tests
    #[derive(Default)]
    struct MemoryStore {
        flow: Option<FlowInstance>,
        stage_statuses: Vec<StageStatus>,
        tasks: Vec<Task>,
        // Conflicts to inject on the next flow saves
        conflicts_remaining: u32,
        flow_saves: u32,
        stage_saves: HashMap<i64, u32>,
    }

    impl MemoryStore {
        fn with_flow(mut self, id: i64) -> Self {
            let mut flow = FlowInstance::new("test flow".to_string(), 1);
            flow.id = Some(id);
            self.flow = Some(flow);
            self
        }

        fn add_stage(&mut self, id: i64) {
            let mut ss = StageStatus::new(self.flow_id(), id);
            ss.id = Some(id);
            self.stage_statuses.push(ss);
        }

        fn add_task(&mut self, stage_status_id: Option<i64>, status: TaskStatus, progress: i64) {
            let mut task = Task::new("task".to_string(), self.flow_id());
            task.stage_status_id = stage_status_id;
            task.status = status;
            task.progress = progress;
            self.tasks.push(task);
        }

        fn add_task_with_deadline(
            &mut self,
            stage_status_id: Option<i64>,
            status: TaskStatus,
            deadline_ts: i64,
        ) {
            let mut task = Task::new("task".to_string(), self.flow_id());
            task.stage_status_id = stage_status_id;
            task.status = status;
            task.deadline_ts = Some(deadline_ts);
            self.tasks.push(task);
        }

        fn flow_id(&self) -> i64 {
            self.flow.as_ref().and_then(|f| f.id).unwrap_or(1)
        }

        fn stage(&self, id: i64) -> &StageStatus {
            self.stage_statuses
                .iter()
                .find(|s| s.id == Some(id))
                .unwrap()
        }
    }

    impl FlowStore for MemoryStore {
        fn load_flow_instance(&self, id: i64) -> Result<FlowInstance, StoreError> {
            match &self.flow {
                Some(flow) if flow.id == Some(id) => Ok(flow.clone()),
                _ => Err(StoreError::NotFound(id)),
            }
        }

        fn load_stage_statuses(&self, _instance_id: i64) -> Result<Vec<StageStatus>, StoreError> {
            Ok(self.stage_statuses.clone())
        }

        fn load_tasks(&self, _instance_id: i64) -> Result<Vec<Task>, StoreError> {
            Ok(self.tasks.clone())
        }

        fn save_stage_status(
            &mut self,
            id: i64,
            progress: i64,
            status: TaskStatus,
        ) -> Result<(), StoreError> {
            *self.stage_saves.entry(id).or_insert(0) += 1;
            let ss = self
                .stage_statuses
                .iter_mut()
                .find(|s| s.id == Some(id))
                .ok_or(StoreError::NotFound(id))?;
            ss.progress = progress;
            ss.status = status;
            Ok(())
        }

        fn save_flow_instance(
            &mut self,
            id: i64,
            expected_revision: i64,
            progress: i64,
            health: FlowHealth,
        ) -> Result<(), StoreError> {
            let flow = match &mut self.flow {
                Some(flow) if flow.id == Some(id) => flow,
                _ => return Err(StoreError::NotFound(id)),
            };
            if self.conflicts_remaining > 0 {
                self.conflicts_remaining -= 1;
                flow.revision += 1;
                return Err(StoreError::Conflict(id));
            }
            if flow.revision != expected_revision {
                return Err(StoreError::Conflict(id));
            }
            flow.progress = progress;
            flow.health = health;
            flow.revision += 1;
            self.flow_saves += 1;
            Ok(())
        }
    }

    #[test]
    fn test_missing_flow_is_not_found() {
        let mut store = MemoryStore::default();
        match recompute_flow(&mut store, 5) {
            Err(StoreError::NotFound(5)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|r| r.state)),
        }
        assert_eq!(store.flow_saves, 0);
    }

    #[test]
    fn test_no_stages_defaults() {
        let mut store = MemoryStore::default().with_flow(1);
        let result = recompute_flow(&mut store, 1).unwrap();

        assert_eq!(result.flow.progress, 0);
        assert_eq!(result.flow.health, FlowHealth::OnTrack);
        assert_eq!(result.state, FlowState::NotStarted);
        assert_eq!(store.flow_saves, 1);
    }

    #[test]
    fn test_two_stage_scenario() {
        // Stage 1: two completed tasks. Stage 2: one in progress, one pending.
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_stage(20);
        store.add_task(Some(10), TaskStatus::Completed, 100);
        store.add_task(Some(10), TaskStatus::Completed, 100);
        store.add_task(Some(20), TaskStatus::InProgress, 0);
        store.add_task(Some(20), TaskStatus::Pending, 0);

        let result = recompute_flow_at(&mut store, 1, 1_700_000_000).unwrap();

        assert_eq!(store.stage(10).progress, 100);
        assert_eq!(store.stage(10).status, TaskStatus::Completed);
        assert_eq!(store.stage(20).progress, 0);
        assert_eq!(store.stage(20).status, TaskStatus::InProgress);

        // mean(100, 0) = 50
        assert_eq!(result.flow.progress, 50);
        assert_eq!(result.flow.health, FlowHealth::OnTrack);
        assert_eq!(result.state, FlowState::InProgress);
    }

    #[test]
    fn test_all_completed_is_on_track_and_complete() {
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_task(Some(10), TaskStatus::Completed, 100);
        store.add_task(Some(10), TaskStatus::Completed, 100);

        let result = recompute_flow_at(&mut store, 1, 1_700_000_000).unwrap();

        assert_eq!(result.flow.progress, 100);
        assert_eq!(result.flow.health, FlowHealth::OnTrack);
        assert_eq!(result.state, FlowState::Completed);
    }

    #[test]
    fn test_blocked_precedence_over_deadlines() {
        let now = 1_700_000_000;
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_task(Some(10), TaskStatus::Completed, 100);
        store.add_task(Some(10), TaskStatus::Blocked, 0);
        // Overdue pending task alongside the blocked one
        store.add_task_with_deadline(Some(10), TaskStatus::Pending, now - 3600);

        let result = recompute_flow_at(&mut store, 1, now).unwrap();

        assert_eq!(store.stage(10).status, TaskStatus::Blocked);
        assert_eq!(result.flow.health, FlowHealth::AtRisk);
    }

    #[test]
    fn test_completed_flow_ignores_past_deadlines() {
        let now = 1_700_000_000;
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_task_with_deadline(Some(10), TaskStatus::Completed, now - 3600);

        let result = recompute_flow_at(&mut store, 1, now).unwrap();

        assert_eq!(result.flow.health, FlowHealth::OnTrack);
        assert_eq!(result.state, FlowState::Completed);
    }

    #[test]
    fn test_overdue_open_task_is_delayed() {
        let now = 1_700_000_000;
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_task(Some(10), TaskStatus::InProgress, 50);
        store.add_task_with_deadline(Some(10), TaskStatus::Pending, now - 1);

        let result = recompute_flow_at(&mut store, 1, now).unwrap();
        assert_eq!(result.flow.health, FlowHealth::Delayed);
    }

    #[test]
    fn test_unassigned_tasks_count_for_flow_not_stage() {
        let now = 1_700_000_000;
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        // Blocked task not assigned to any stage
        store.add_task(None, TaskStatus::Blocked, 0);

        let result = recompute_flow_at(&mut store, 1, now).unwrap();

        // Stage has no tasks, so it stays pending at 0
        assert_eq!(store.stage(10).progress, 0);
        assert_eq!(store.stage(10).status, TaskStatus::Pending);
        // But the flow still goes at-risk from the unassigned blocked task
        assert_eq!(result.flow.health, FlowHealth::AtRisk);
        assert_eq!(result.state, FlowState::InProgress);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let now = 1_700_000_000;
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_stage(20);
        store.add_task(Some(10), TaskStatus::Completed, 100);
        store.add_task(Some(20), TaskStatus::InProgress, 30);

        let first = recompute_flow_at(&mut store, 1, now).unwrap();
        let second = recompute_flow_at(&mut store, 1, now).unwrap();

        assert_eq!(first.flow.progress, second.flow.progress);
        assert_eq!(first.flow.health, second.flow.health);
        assert_eq!(first.state, second.state);
        assert_eq!(store.stage(10).progress, 100);
        assert_eq!(store.stage(20).progress, 0);
    }

    #[test]
    fn test_conflict_retries_and_succeeds() {
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.add_task(Some(10), TaskStatus::Completed, 100);
        store.conflicts_remaining = 1;

        let result = recompute_flow_at(&mut store, 1, 1_700_000_000).unwrap();

        assert_eq!(result.flow.progress, 100);
        assert_eq!(store.flow_saves, 1);
    }

    #[test]
    fn test_conflict_gives_up_after_bounded_retries() {
        let mut store = MemoryStore::default().with_flow(1);
        store.add_stage(10);
        store.conflicts_remaining = 10;

        match recompute_flow_at(&mut store, 1, 1_700_000_000) {
            Err(StoreError::Conflict(1)) => {}
            other => panic!("expected Conflict, got {:?}", other.map(|r| r.state)),
        }
        assert_eq!(store.flow_saves, 0);
    }
}
