use crate::models::{FlowHealth, Task, TaskStatus};
use crate::progress::StageRollup;

/// Aggregation result for a flow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRollup {
    pub progress: i64,
    pub health: FlowHealth,
}

/// Reduce the per-stage rollups of a flow into overall progress and health.
///
/// Progress is the mean of the per-stage progress values, the one global
/// formula used everywhere: flow progress stays a deterministic function of
/// the stage-status progresses.
///
/// Health precedence, first match wins:
/// 1. any task or stage blocked -> AtRisk
/// 2. any non-completed task with a deadline before `now` -> Delayed
/// 3. otherwise -> OnTrack
///
/// `now` is captured once per aggregation run so all deadline checks see the
/// same instant.
///
/// A flow with no stages has nothing defined yet: (0, OnTrack).
pub fn aggregate_flow(stages: &[StageRollup], tasks: &[Task], now: i64) -> FlowRollup {
    if stages.is_empty() {
        return FlowRollup {
            progress: 0,
            health: FlowHealth::OnTrack,
        };
    }

    let sum: i64 = stages.iter().map(|s| s.progress).sum();
    let progress = (sum as f64 / stages.len() as f64).round() as i64;

    let blocked = tasks.iter().any(|t| t.status == TaskStatus::Blocked)
        || stages.iter().any(|s| s.status == TaskStatus::Blocked);
    let delayed = tasks.iter().any(|t| t.is_overdue(now));

    let health = if blocked {
        FlowHealth::AtRisk
    } else if delayed {
        FlowHealth::Delayed
    } else {
        FlowHealth::OnTrack
    };

    FlowRollup { progress, health }
}
