use serde::{Deserialize, Serialize};

use crate::models::TaskStatus;

/// Live state of one template stage within a flow instance.
/// One row per (instance, stage) pair, created at instantiation time.
///
/// `progress` and `status` are normally written by the aggregation engine;
/// an operator override is allowed but transient, the next recompute wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub id: Option<i64>,
    pub instance_id: i64,
    pub stage_id: i64,
    pub progress: i64,
    pub status: TaskStatus,
    pub owner: Option<String>,
    pub created_ts: i64,
    pub modified_ts: i64,
}

impl StageStatus {
    pub fn new(instance_id: i64, stage_id: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            instance_id,
            stage_id,
            progress: 0,
            status: TaskStatus::Pending,
            owner: None,
            created_ts: now,
            modified_ts: now,
        }
    }
}
