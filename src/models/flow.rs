use serde::{Deserialize, Serialize};

/// Risk classification for a running flow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowHealth {
    OnTrack,
    AtRisk,
    Delayed,
}

impl FlowHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowHealth::OnTrack => "on_track",
            FlowHealth::AtRisk => "at_risk",
            FlowHealth::Delayed => "delayed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "on_track" => Some(FlowHealth::OnTrack),
            "at_risk" => Some(FlowHealth::AtRisk),
            "delayed" => Some(FlowHealth::Delayed),
            _ => None,
        }
    }
}

/// Coarse lifecycle classification of a flow instance.
///
/// Never persisted; always re-derived from current stage/task data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    NotStarted,
    InProgress,
    Completed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::NotStarted => "not_started",
            FlowState::InProgress => "in_progress",
            FlowState::Completed => "completed",
        }
    }
}

/// A reusable workflow definition: an ordered list of stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub created_ts: i64,
    pub modified_ts: i64,
}

impl FlowTemplate {
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            name,
            description,
            created_ts: now,
            modified_ts: now,
        }
    }
}

/// One stage within a template, ordered by position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStage {
    pub id: Option<i64>,
    pub template_id: i64,
    pub name: String,
    pub position: i64,
}

/// A running execution of a flow template (aggregate root).
///
/// `progress` and `health` are derived by the aggregation engine and only
/// written through it. `revision` is bumped on every engine write and guards
/// the read-compute-write cycle against concurrent recomputes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInstance {
    pub id: Option<i64>,
    pub uuid: String,
    pub name: String,
    pub template_id: i64,
    pub progress: i64,
    pub health: FlowHealth,
    pub kickoff_ts: Option<i64>,
    pub due_ts: Option<i64>,
    pub revision: i64,
    pub created_ts: i64,
    pub modified_ts: i64,
}

impl FlowInstance {
    pub fn new(name: String, template_id: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            uuid: uuid::Uuid::new_v4().to_string(),
            name,
            template_id,
            progress: 0,
            health: FlowHealth::OnTrack,
            kickoff_ts: None,
            due_ts: None,
            revision: 0,
            created_ts: now,
            modified_ts: now,
        }
    }
}
