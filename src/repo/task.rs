use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{clamp_progress, Task, TaskStatus};
use anyhow::{Context, Result};

/// Task repository for database operations
pub struct TaskRepo;

impl TaskRepo {
    fn from_row(row: &Row) -> rusqlite::Result<Task> {
        Ok(Task {
            id: Some(row.get(0)?),
            uuid: row.get(1)?,
            title: row.get(2)?,
            status: TaskStatus::from_str(&row.get::<_, String>(3)?)
                .unwrap_or(TaskStatus::Pending),
            progress: clamp_progress(row.get(4)?),
            deadline_ts: row.get(5)?,
            flow_instance_id: row.get(6)?,
            stage_status_id: row.get(7)?,
            owner: row.get(8)?,
            created_ts: row.get(9)?,
            modified_ts: row.get(10)?,
        })
    }

    const COLUMNS: &'static str = "id, uuid, title, status, progress, deadline_ts,
                    flow_instance_id, stage_status_id, owner, created_ts, modified_ts";

    /// Create a new task under a flow instance
    pub fn create(
        conn: &Connection,
        title: &str,
        flow_instance_id: i64,
        stage_status_id: Option<i64>,
        deadline_ts: Option<i64>,
        owner: Option<&str>,
    ) -> Result<Task> {
        let mut task = Task::new(title.to_string(), flow_instance_id);
        task.stage_status_id = stage_status_id;
        task.deadline_ts = deadline_ts;
        task.owner = owner.map(String::from);

        conn.execute(
            "INSERT INTO tasks (uuid, title, status, progress, deadline_ts,
                    flow_instance_id, stage_status_id, owner, created_ts, modified_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                task.uuid,
                task.title,
                task.status.as_str(),
                task.progress,
                task.deadline_ts,
                task.flow_instance_id,
                task.stage_status_id,
                task.owner,
                task.created_ts,
                task.modified_ts
            ],
        )
        .with_context(|| format!("Failed to create task: {}", title))?;

        let id = conn.last_insert_rowid();

        Ok(Task {
            id: Some(id),
            ..task
        })
    }

    /// Get task by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Task>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE id = ?1",
            Self::COLUMNS
        ))?;

        let task = stmt.query_row([id], Self::from_row).optional()?;
        Ok(task)
    }

    /// List tasks for a flow instance
    pub fn list_for_instance(conn: &Connection, instance_id: i64) -> Result<Vec<Task>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE flow_instance_id = ?1 ORDER BY id",
            Self::COLUMNS
        ))?;

        let rows = stmt.query_map([instance_id], Self::from_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// List all tasks, optionally filtered by status
    pub fn list_all(conn: &Connection, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();

        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM tasks WHERE status = ?1 ORDER BY deadline_ts IS NULL, deadline_ts",
                    Self::COLUMNS
                ))?;
                let rows = stmt.query_map([status.as_str()], Self::from_row)?;
                for row in rows {
                    tasks.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM tasks ORDER BY deadline_ts IS NULL, deadline_ts",
                    Self::COLUMNS
                ))?;
                let rows = stmt.query_map([], Self::from_row)?;
                for row in rows {
                    tasks.push(row?);
                }
            }
        }

        Ok(tasks)
    }

    /// Update task fields; None leaves a field unchanged
    pub fn update(
        conn: &Connection,
        id: i64,
        title: Option<&str>,
        deadline_ts: Option<Option<i64>>,
        stage_status_id: Option<Option<i64>>,
        owner: Option<&str>,
        progress: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        if let Some(title) = title {
            conn.execute(
                "UPDATE tasks SET title = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![title, now, id],
            )?;
        }
        if let Some(deadline_ts) = deadline_ts {
            conn.execute(
                "UPDATE tasks SET deadline_ts = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![deadline_ts, now, id],
            )?;
        }
        if let Some(stage_status_id) = stage_status_id {
            conn.execute(
                "UPDATE tasks SET stage_status_id = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![stage_status_id, now, id],
            )?;
        }
        if let Some(owner) = owner {
            conn.execute(
                "UPDATE tasks SET owner = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![owner, now, id],
            )?;
        }
        if let Some(progress) = progress {
            conn.execute(
                "UPDATE tasks SET progress = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![clamp_progress(progress), now, id],
            )?;
        }

        Ok(())
    }

    /// Set task status, optionally with a progress update.
    /// Completing a task pins its progress to 100.
    pub fn set_status(
        conn: &Connection,
        id: i64,
        status: TaskStatus,
        progress: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let progress = match (status, progress) {
            (TaskStatus::Completed, _) => Some(100),
            (_, Some(p)) => Some(clamp_progress(p)),
            (_, None) => None,
        };

        let updated = match progress {
            Some(progress) => conn.execute(
                "UPDATE tasks SET status = ?1, progress = ?2, modified_ts = ?3 WHERE id = ?4",
                rusqlite::params![status.as_str(), progress, now, id],
            )?,
            None => conn.execute(
                "UPDATE tasks SET status = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), now, id],
            )?,
        };

        if updated == 0 {
            anyhow::bail!("No task found with id={}", id);
        }

        Ok(())
    }

    /// Tasks needing attention: blocked, or overdue and not completed
    pub fn alerts(conn: &Connection, now: i64) -> Result<Vec<Task>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE status = 'blocked'
                OR (status != 'completed' AND deadline_ts IS NOT NULL AND deadline_ts < ?1)
             ORDER BY deadline_ts IS NULL, deadline_ts",
            Self::COLUMNS
        ))?;

        let rows = stmt.query_map([now], Self::from_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Count tasks grouped by status, across all flows
    pub fn count_by_status(conn: &Connection) -> Result<Vec<(TaskStatus, i64)>> {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = TaskStatus::from_str(&status) {
                counts.push((status, count));
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::repo::{FlowRepo, TemplateRepo};

    fn setup(conn: &Connection) -> i64 {
        let template =
            TemplateRepo::create(conn, "intake", None, &["triage".to_string()]).unwrap();
        let instance =
            FlowRepo::create(conn, "case 42", template.id.unwrap(), None, None).unwrap();
        instance.id.unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let instance_id = setup(&conn);

        let task =
            TaskRepo::create(&conn, "Collect documents", instance_id, None, None, Some("ana"))
                .unwrap();
        let fetched = TaskRepo::get_by_id(&conn, task.id.unwrap()).unwrap().unwrap();

        assert_eq!(fetched.title, "Collect documents");
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.owner.as_deref(), Some("ana"));
    }

    #[test]
    fn test_set_status_completed_pins_progress() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let instance_id = setup(&conn);
        let task = TaskRepo::create(&conn, "Sign", instance_id, None, None, None).unwrap();
        let id = task.id.unwrap();

        TaskRepo::set_status(&conn, id, TaskStatus::Completed, None).unwrap();
        let fetched = TaskRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.progress, 100);
    }

    #[test]
    fn test_set_status_clamps_progress() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let instance_id = setup(&conn);
        let task = TaskRepo::create(&conn, "Draft", instance_id, None, None, None).unwrap();
        let id = task.id.unwrap();

        TaskRepo::set_status(&conn, id, TaskStatus::InProgress, Some(150)).unwrap();
        let fetched = TaskRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.progress, 100);
    }

    #[test]
    fn test_alerts() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let instance_id = setup(&conn);
        let now = chrono::Utc::now().timestamp();

        let blocked = TaskRepo::create(&conn, "Blocked", instance_id, None, None, None).unwrap();
        TaskRepo::set_status(&conn, blocked.id.unwrap(), TaskStatus::Blocked, None).unwrap();

        TaskRepo::create(&conn, "Overdue", instance_id, None, Some(now - 3600), None).unwrap();

        let done =
            TaskRepo::create(&conn, "Done late", instance_id, None, Some(now - 3600), None)
                .unwrap();
        TaskRepo::set_status(&conn, done.id.unwrap(), TaskStatus::Completed, None).unwrap();

        TaskRepo::create(&conn, "Future", instance_id, None, Some(now + 3600), None).unwrap();

        let alerts = TaskRepo::alerts(&conn, now).unwrap();
        let titles: Vec<&str> = alerts.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(alerts.len(), 2);
        assert!(titles.contains(&"Blocked"));
        assert!(titles.contains(&"Overdue"));
    }

    #[test]
    fn test_count_by_status() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let instance_id = setup(&conn);

        TaskRepo::create(&conn, "A", instance_id, None, None, None).unwrap();
        TaskRepo::create(&conn, "B", instance_id, None, None, None).unwrap();
        let c = TaskRepo::create(&conn, "C", instance_id, None, None, None).unwrap();
        TaskRepo::set_status(&conn, c.id.unwrap(), TaskStatus::InProgress, None).unwrap();

        let counts = TaskRepo::count_by_status(&conn).unwrap();
        assert!(counts.contains(&(TaskStatus::Pending, 2)));
        assert!(counts.contains(&(TaskStatus::InProgress, 1)));
    }
}
