use rusqlite::{Connection, Result};
use std::collections::HashMap;

/// Current database schema version
const CURRENT_VERSION: u32 = 2;

/// Migration system for managing database schema versions
pub struct MigrationManager;

impl MigrationManager {
    /// Initialize the database with the current schema
    /// This creates the schema_version table and applies all migrations
    pub fn initialize(conn: &Connection) -> Result<()> {
        // Create schema_version table to track migrations
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        // Get current version
        let current_version: u32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        // Apply migrations up to current version
        for version in (current_version + 1)..=CURRENT_VERSION {
            Self::apply_migration(conn, version)?;
        }

        Ok(())
    }

    /// Apply a specific migration by version number
    fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
        let migrations = get_migrations();
        if let Some(migration) = migrations.get(&version) {
            // Execute migration in a transaction
            let tx = conn.unchecked_transaction()?;
            migration(&tx)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
                Some(format!("No migration found for version {}", version)),
            ))
        }
    }

    /// Get the current schema version
    pub fn get_version(conn: &Connection) -> Result<u32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

/// Get all migrations indexed by version
fn get_migrations() -> HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> {
    let mut migrations: HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> = HashMap::new();
    migrations.insert(1, migration_v1);
    migrations.insert(2, migration_v2);
    migrations
}

/// Migration v1: Initial schema
fn migration_v1(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    // Enable foreign keys
    tx.execute("PRAGMA foreign_keys=ON", [])?;

    // Flow templates table
    tx.execute(
        "CREATE TABLE flow_templates (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NULL,
            created_ts INTEGER NOT NULL,
            modified_ts INTEGER NOT NULL
        )",
        [],
    )?;

    // Template stages table
    // position is the 1-based order within the template
    tx.execute(
        "CREATE TABLE flow_stages (
            id INTEGER PRIMARY KEY,
            template_id INTEGER NOT NULL REFERENCES flow_templates(id),
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE(template_id, position),
            UNIQUE(template_id, name)
        )",
        [],
    )?;

    // Flow instances table
    tx.execute(
        "CREATE TABLE flow_instances (
            id INTEGER PRIMARY KEY,
            uuid TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            template_id INTEGER NOT NULL REFERENCES flow_templates(id),
            progress INTEGER NOT NULL DEFAULT 0 CHECK(progress BETWEEN 0 AND 100),
            health TEXT NOT NULL DEFAULT 'on_track'
                CHECK(health IN ('on_track','at_risk','delayed')),
            kickoff_ts INTEGER NULL,
            due_ts INTEGER NULL,
            created_ts INTEGER NOT NULL,
            modified_ts INTEGER NOT NULL
        )",
        [],
    )?;

    // Stage statuses: one row per (instance, stage) pair
    tx.execute(
        "CREATE TABLE stage_statuses (
            id INTEGER PRIMARY KEY,
            instance_id INTEGER NOT NULL REFERENCES flow_instances(id),
            stage_id INTEGER NOT NULL REFERENCES flow_stages(id),
            progress INTEGER NOT NULL DEFAULT 0 CHECK(progress BETWEEN 0 AND 100),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending','in_progress','blocked','returned','completed')),
            owner TEXT NULL,
            created_ts INTEGER NOT NULL,
            modified_ts INTEGER NOT NULL,
            UNIQUE(instance_id, stage_id)
        )",
        [],
    )?;

    // Tasks table
    tx.execute(
        "CREATE TABLE tasks (
            id INTEGER PRIMARY KEY,
            uuid TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending','in_progress','blocked','returned','completed')),
            progress INTEGER NOT NULL DEFAULT 0 CHECK(progress BETWEEN 0 AND 100),
            deadline_ts INTEGER NULL,
            flow_instance_id INTEGER NOT NULL REFERENCES flow_instances(id),
            stage_status_id INTEGER NULL REFERENCES stage_statuses(id),
            owner TEXT NULL,
            created_ts INTEGER NOT NULL,
            modified_ts INTEGER NOT NULL
        )",
        [],
    )?;

    // Indexes for the aggregation read path
    tx.execute(
        "CREATE INDEX idx_tasks_flow_instance ON tasks(flow_instance_id)",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_tasks_stage_status ON tasks(stage_status_id)",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_stage_statuses_instance ON stage_statuses(instance_id)",
        [],
    )?;

    Ok(())
}

/// Migration v2: optimistic concurrency for recompute
/// Adds a revision counter to flow_instances; the engine's save checks it.
fn migration_v2(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "ALTER TABLE flow_instances ADD COLUMN revision INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}
