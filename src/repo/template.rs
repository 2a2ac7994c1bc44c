use rusqlite::{Connection, OptionalExtension};
use crate::models::{FlowStage, FlowTemplate};
use anyhow::{Context, Result};

/// Flow template repository for database operations
pub struct TemplateRepo;

impl TemplateRepo {
    /// Create a template together with its ordered stages
    pub fn create(
        conn: &Connection,
        name: &str,
        description: Option<&str>,
        stage_names: &[String],
    ) -> Result<FlowTemplate> {
        let template = FlowTemplate::new(name.to_string(), description.map(String::from));

        conn.execute(
            "INSERT INTO flow_templates (name, description, created_ts, modified_ts)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                template.name,
                template.description,
                template.created_ts,
                template.modified_ts
            ],
        )
        .with_context(|| format!("Failed to create template: {}", name))?;

        let id = conn.last_insert_rowid();

        for (idx, stage_name) in stage_names.iter().enumerate() {
            conn.execute(
                "INSERT INTO flow_stages (template_id, name, position) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, stage_name, (idx + 1) as i64],
            )
            .with_context(|| format!("Failed to create stage '{}' for template", stage_name))?;
        }

        Ok(FlowTemplate {
            id: Some(id),
            ..template
        })
    }

    /// Get template by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<FlowTemplate>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_ts, modified_ts
             FROM flow_templates WHERE id = ?1",
        )?;

        let template = stmt
            .query_row([id], |row| {
                Ok(FlowTemplate {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_ts: row.get(3)?,
                    modified_ts: row.get(4)?,
                })
            })
            .optional()?;

        Ok(template)
    }

    /// Get template by name
    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<FlowTemplate>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_ts, modified_ts
             FROM flow_templates WHERE name = ?1",
        )?;

        let template = stmt
            .query_row([name], |row| {
                Ok(FlowTemplate {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_ts: row.get(3)?,
                    modified_ts: row.get(4)?,
                })
            })
            .optional()?;

        Ok(template)
    }

    /// Resolve a template reference that may be a numeric ID or a name
    pub fn resolve(conn: &Connection, reference: &str) -> Result<Option<FlowTemplate>> {
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(template) = Self::get_by_id(conn, id)? {
                return Ok(Some(template));
            }
        }
        Self::get_by_name(conn, reference)
    }

    /// List all templates
    pub fn list_all(conn: &Connection) -> Result<Vec<FlowTemplate>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_ts, modified_ts
             FROM flow_templates ORDER BY name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(FlowTemplate {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                description: row.get(2)?,
                created_ts: row.get(3)?,
                modified_ts: row.get(4)?,
            })
        })?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?);
        }
        Ok(templates)
    }

    /// Get the ordered stages of a template
    pub fn stages(conn: &Connection, template_id: i64) -> Result<Vec<FlowStage>> {
        let mut stmt = conn.prepare(
            "SELECT id, template_id, name, position
             FROM flow_stages WHERE template_id = ?1 ORDER BY position",
        )?;

        let rows = stmt.query_map([template_id], |row| {
            Ok(FlowStage {
                id: Some(row.get(0)?),
                template_id: row.get(1)?,
                name: row.get(2)?,
                position: row.get(3)?,
            })
        })?;

        let mut stages = Vec::new();
        for row in rows {
            stages.push(row?);
        }
        Ok(stages)
    }

    /// Count flow instances created from a template
    pub fn instance_count(conn: &Connection, template_id: i64) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM flow_instances WHERE template_id = ?1",
            [template_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete a template and its stages.
    /// Refused while flow instances created from it still exist.
    pub fn delete(conn: &Connection, template_id: i64) -> Result<()> {
        let instances = Self::instance_count(conn, template_id)?;
        if instances > 0 {
            anyhow::bail!(
                "Cannot delete template with {} active instance(s). Delete the flows first.",
                instances
            );
        }

        conn.execute(
            "DELETE FROM flow_stages WHERE template_id = ?1",
            [template_id],
        )?;
        let deleted = conn.execute("DELETE FROM flow_templates WHERE id = ?1", [template_id])?;

        if deleted == 0 {
            anyhow::bail!("No template found with id={}", template_id);
        }

        Ok(())
    }
}
