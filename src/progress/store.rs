use rusqlite::Connection;
use thiserror::Error;

use crate::models::{FlowHealth, FlowInstance, StageStatus, Task, TaskStatus};
use crate::repo::{FlowRepo, StageStatusRepo, TaskRepo};

/// Errors surfaced by a flow store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No flow instance found with id={0}")]
    NotFound(i64),
    #[error("Flow instance id={0} was modified concurrently")]
    Conflict(i64),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence contract consumed by the aggregation engine.
///
/// The engine never touches a connection directly; everything it reads and
/// writes goes through this trait, so tests can run it against an in-memory
/// fake and the recompute logic stays deterministic.
pub trait FlowStore {
    /// Load the aggregate root. Missing instance is an error, surfaced
    /// before any write happens.
    fn load_flow_instance(&self, id: i64) -> Result<FlowInstance, StoreError>;

    /// Load the stage statuses of an instance, in template stage order.
    fn load_stage_statuses(&self, instance_id: i64) -> Result<Vec<StageStatus>, StoreError>;

    /// Load every task under an instance.
    fn load_tasks(&self, instance_id: i64) -> Result<Vec<Task>, StoreError>;

    /// Persist one stage's aggregation result. Called once per stage per
    /// recompute.
    fn save_stage_status(
        &mut self,
        id: i64,
        progress: i64,
        status: TaskStatus,
    ) -> Result<(), StoreError>;

    /// Persist the flow-level aggregation result. Called once per recompute.
    /// Fails with `Conflict` when `expected_revision` no longer matches the
    /// stored row.
    fn save_flow_instance(
        &mut self,
        id: i64,
        expected_revision: i64,
        progress: i64,
        health: FlowHealth,
    ) -> Result<(), StoreError>;
}

/// Production store over a SQLite connection
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl FlowStore for SqliteStore<'_> {
    fn load_flow_instance(&self, id: i64) -> Result<FlowInstance, StoreError> {
        FlowRepo::get_by_id(self.conn, id)?.ok_or(StoreError::NotFound(id))
    }

    fn load_stage_statuses(&self, instance_id: i64) -> Result<Vec<StageStatus>, StoreError> {
        Ok(StageStatusRepo::list_for_instance(self.conn, instance_id)?)
    }

    fn load_tasks(&self, instance_id: i64) -> Result<Vec<Task>, StoreError> {
        Ok(TaskRepo::list_for_instance(self.conn, instance_id)?)
    }

    fn save_stage_status(
        &mut self,
        id: i64,
        progress: i64,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        Ok(StageStatusRepo::save_rollup(self.conn, id, progress, status)?)
    }

    fn save_flow_instance(
        &mut self,
        id: i64,
        expected_revision: i64,
        progress: i64,
        health: FlowHealth,
    ) -> Result<(), StoreError> {
        let updated = FlowRepo::save_rollup(self.conn, id, expected_revision, progress, health)?;
        if updated {
            return Ok(());
        }
        // Zero rows updated: either the instance vanished or a concurrent
        // recompute bumped the revision first.
        match FlowRepo::get_by_id(self.conn, id)? {
            Some(_) => Err(StoreError::Conflict(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::repo::TemplateRepo;

    #[test]
    fn test_load_missing_instance_is_not_found() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let store = SqliteStore::new(&conn);

        match store.load_flow_instance(999) {
            Err(StoreError::NotFound(999)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|f| f.id)),
        }
    }

    #[test]
    fn test_save_with_stale_revision_is_conflict() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let template =
            TemplateRepo::create(&conn, "t", None, &["s".to_string()]).unwrap();
        let instance =
            FlowRepo::create(&conn, "f", template.id.unwrap(), None, None).unwrap();
        let id = instance.id.unwrap();

        let mut store = SqliteStore::new(&conn);
        store
            .save_flow_instance(id, 0, 10, FlowHealth::OnTrack)
            .unwrap();

        match store.save_flow_instance(id, 0, 20, FlowHealth::OnTrack) {
            Err(StoreError::Conflict(conflict_id)) => assert_eq!(conflict_id, id),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_save_missing_instance_is_not_found() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let mut store = SqliteStore::new(&conn);

        match store.save_flow_instance(999, 0, 10, FlowHealth::OnTrack) {
            Err(StoreError::NotFound(999)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
