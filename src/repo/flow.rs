use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{FlowHealth, FlowInstance};
use crate::repo::TemplateRepo;
use anyhow::{Context, Result};

/// Flow instance repository for database operations
pub struct FlowRepo;

impl FlowRepo {
    fn from_row(row: &Row) -> rusqlite::Result<FlowInstance> {
        Ok(FlowInstance {
            id: Some(row.get(0)?),
            uuid: row.get(1)?,
            name: row.get(2)?,
            template_id: row.get(3)?,
            progress: row.get(4)?,
            health: FlowHealth::from_str(&row.get::<_, String>(5)?)
                .unwrap_or(FlowHealth::OnTrack),
            kickoff_ts: row.get(6)?,
            due_ts: row.get(7)?,
            revision: row.get(8)?,
            created_ts: row.get(9)?,
            modified_ts: row.get(10)?,
        })
    }

    const COLUMNS: &'static str = "id, uuid, name, template_id, progress, health,
                    kickoff_ts, due_ts, revision, created_ts, modified_ts";

    /// Instantiate a flow from a template.
    /// Creates the instance row plus one stage status per template stage.
    pub fn create(
        conn: &Connection,
        name: &str,
        template_id: i64,
        kickoff_ts: Option<i64>,
        due_ts: Option<i64>,
    ) -> Result<FlowInstance> {
        let mut instance = FlowInstance::new(name.to_string(), template_id);
        instance.kickoff_ts = kickoff_ts;
        instance.due_ts = due_ts;

        conn.execute(
            "INSERT INTO flow_instances (uuid, name, template_id, progress, health,
                    kickoff_ts, due_ts, revision, created_ts, modified_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                instance.uuid,
                instance.name,
                instance.template_id,
                instance.progress,
                instance.health.as_str(),
                instance.kickoff_ts,
                instance.due_ts,
                instance.revision,
                instance.created_ts,
                instance.modified_ts
            ],
        )
        .with_context(|| format!("Failed to create flow instance: {}", name))?;

        let id = conn.last_insert_rowid();

        // One stage status per template stage, all pending
        let stages = TemplateRepo::stages(conn, template_id)?;
        let now = chrono::Utc::now().timestamp();
        for stage in &stages {
            conn.execute(
                "INSERT INTO stage_statuses (instance_id, stage_id, progress, status,
                        created_ts, modified_ts)
                 VALUES (?1, ?2, 0, 'pending', ?3, ?3)",
                rusqlite::params![id, stage.id, now],
            )?;
        }

        Ok(FlowInstance {
            id: Some(id),
            ..instance
        })
    }

    /// Get flow instance by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<FlowInstance>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM flow_instances WHERE id = ?1",
            Self::COLUMNS
        ))?;

        let instance = stmt.query_row([id], Self::from_row).optional()?;
        Ok(instance)
    }

    /// List all flow instances
    pub fn list_all(conn: &Connection) -> Result<Vec<FlowInstance>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM flow_instances ORDER BY id",
            Self::COLUMNS
        ))?;

        let rows = stmt.query_map([], Self::from_row)?;

        let mut instances = Vec::new();
        for row in rows {
            instances.push(row?);
        }
        Ok(instances)
    }

    /// Persist an aggregation result under an optimistic revision check.
    ///
    /// Returns true when the row was updated; false when the stored revision
    /// no longer matches `expected_revision` (a concurrent recompute won).
    pub fn save_rollup(
        conn: &Connection,
        id: i64,
        expected_revision: i64,
        progress: i64,
        health: FlowHealth,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let updated = conn
            .execute(
                "UPDATE flow_instances
                 SET progress = ?1, health = ?2, revision = revision + 1, modified_ts = ?3
                 WHERE id = ?4 AND revision = ?5",
                rusqlite::params![progress, health.as_str(), now, id, expected_revision],
            )
            .with_context(|| format!("Failed to save rollup for flow instance id={}", id))?;
        Ok(updated == 1)
    }

    /// Delete a flow instance, cascading tasks and stage statuses
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM tasks WHERE flow_instance_id = ?1", [id])?;
        conn.execute("DELETE FROM stage_statuses WHERE instance_id = ?1", [id])?;
        let deleted = conn.execute("DELETE FROM flow_instances WHERE id = ?1", [id])?;

        if deleted == 0 {
            anyhow::bail!("No flow instance found with id={}", id);
        }

        Ok(())
    }
}
