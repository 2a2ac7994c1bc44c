use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{clamp_progress, StageStatus, TaskStatus};
use anyhow::{Context, Result};

/// Stage status repository for database operations
pub struct StageStatusRepo;

impl StageStatusRepo {
    fn from_row(row: &Row) -> rusqlite::Result<StageStatus> {
        Ok(StageStatus {
            id: Some(row.get(0)?),
            instance_id: row.get(1)?,
            stage_id: row.get(2)?,
            progress: clamp_progress(row.get(3)?),
            status: TaskStatus::from_str(&row.get::<_, String>(4)?)
                .unwrap_or(TaskStatus::Pending),
            owner: row.get(5)?,
            created_ts: row.get(6)?,
            modified_ts: row.get(7)?,
        })
    }

    /// List stage statuses for a flow instance, in template stage order
    pub fn list_for_instance(conn: &Connection, instance_id: i64) -> Result<Vec<StageStatus>> {
        let mut stmt = conn.prepare(
            "SELECT ss.id, ss.instance_id, ss.stage_id, ss.progress, ss.status, ss.owner,
                    ss.created_ts, ss.modified_ts
             FROM stage_statuses ss
             JOIN flow_stages fs ON fs.id = ss.stage_id
             WHERE ss.instance_id = ?1
             ORDER BY fs.position",
        )?;

        let rows = stmt.query_map([instance_id], Self::from_row)?;

        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    /// Find the stage status for a named stage of an instance
    pub fn get_by_stage_name(
        conn: &Connection,
        instance_id: i64,
        stage_name: &str,
    ) -> Result<Option<StageStatus>> {
        let mut stmt = conn.prepare(
            "SELECT ss.id, ss.instance_id, ss.stage_id, ss.progress, ss.status, ss.owner,
                    ss.created_ts, ss.modified_ts
             FROM stage_statuses ss
             JOIN flow_stages fs ON fs.id = ss.stage_id
             WHERE ss.instance_id = ?1 AND fs.name = ?2",
        )?;

        let status = stmt
            .query_row(rusqlite::params![instance_id, stage_name], Self::from_row)
            .optional()?;
        Ok(status)
    }

    /// Operator override of a stage's status/progress/owner.
    /// The caller is expected to recompute the owning flow right after;
    /// the computed values win over whatever is written here.
    pub fn apply_override(
        conn: &Connection,
        id: i64,
        status: Option<TaskStatus>,
        progress: Option<i64>,
        owner: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        if let Some(status) = status {
            conn.execute(
                "UPDATE stage_statuses SET status = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), now, id],
            )?;
        }
        if let Some(progress) = progress {
            conn.execute(
                "UPDATE stage_statuses SET progress = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![clamp_progress(progress), now, id],
            )?;
        }
        if let Some(owner) = owner {
            conn.execute(
                "UPDATE stage_statuses SET owner = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![owner, now, id],
            )?;
        }

        Ok(())
    }

    /// Persist an aggregation result for one stage
    pub fn save_rollup(
        conn: &Connection,
        id: i64,
        progress: i64,
        status: TaskStatus,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let updated = conn
            .execute(
                "UPDATE stage_statuses
                 SET progress = ?1, status = ?2, modified_ts = ?3
                 WHERE id = ?4",
                rusqlite::params![clamp_progress(progress), status.as_str(), now, id],
            )
            .with_context(|| format!("Failed to save rollup for stage status id={}", id))?;

        if updated == 0 {
            anyhow::bail!("No stage status found with id={}", id);
        }

        Ok(())
    }
}
