use clap::{Parser, Subcommand};
use rusqlite::Connection;
use anyhow::Result;

use crate::cli::error::{parse_status_arg, validate_non_empty, validate_template_name};
use crate::cli::output;
use crate::db::DbConnection;
use crate::models::{FlowState, StageStatus};
use crate::progress::{self, classify_persisted, RecomputeResult, SqliteStore};
use crate::repo::{FlowRepo, StageStatusRepo, TaskRepo, TemplateRepo};
use crate::utils::parse_date_expr;

#[derive(Parser)]
#[command(name = "opflow")]
#[command(about = "Operational flow tracker - stage templates, flow instances, tasks, and progress/health rollups")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flow template management commands
    Template {
        #[command(subcommand)]
        subcommand: TemplateCommands,
    },
    /// Flow instance management commands
    Flow {
        #[command(subcommand)]
        subcommand: FlowCommands,
    },
    /// Task management commands
    Task {
        #[command(subcommand)]
        subcommand: TaskCommands,
    },
    /// Stage status commands
    Stage {
        #[command(subcommand)]
        subcommand: StageCommands,
    },
    /// Show blocked and overdue tasks
    Alerts {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show a dashboard of flows and task counts
    Report,
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Create a template with its ordered stages
    Add {
        /// Template name
        name: String,
        /// Stage name, repeatable, in order
        #[arg(long = "stage", required = true)]
        stages: Vec<String>,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// List templates
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Delete a template (refused while instances exist)
    Delete {
        /// Template ID or name
        template: String,
    },
}

#[derive(Subcommand)]
pub enum FlowCommands {
    /// Instantiate a flow from a template
    Create {
        /// Flow name
        name: String,
        /// Template ID or name
        #[arg(long)]
        template: String,
        /// Kickoff date (e.g. 2026-03-01, today)
        #[arg(long)]
        kickoff: Option<String>,
        /// Due date (e.g. 2026-04-01, +30d)
        #[arg(long)]
        due: Option<String>,
    },
    /// List flow instances
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show one flow instance with its stages
    Show {
        /// Flow instance ID
        id: i64,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Recompute progress, health, and lifecycle state
    Recompute {
        /// Flow instance ID
        id: i64,
    },
    /// Delete a flow instance and everything under it
    Delete {
        /// Flow instance ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task to a flow
    Add {
        /// Task title
        title: String,
        /// Owning flow instance ID
        #[arg(long)]
        flow: i64,
        /// Stage name within the flow's template
        #[arg(long)]
        stage: Option<String>,
        /// Deadline (e.g. 2026-03-15, tomorrow, +7d)
        #[arg(long)]
        deadline: Option<String>,
        /// Owner name
        #[arg(long)]
        owner: Option<String>,
    },
    /// List tasks
    List {
        /// Only tasks of this flow instance
        #[arg(long)]
        flow: Option<i64>,
        /// Only tasks with this status
        #[arg(long)]
        status: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Modify task fields
    Modify {
        /// Task ID
        id: i64,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New deadline
        #[arg(long)]
        deadline: Option<String>,
        /// Move to this stage of the flow's template
        #[arg(long)]
        stage: Option<String>,
        /// New owner
        #[arg(long)]
        owner: Option<String>,
        /// Progress percentage (clamped to 0-100)
        #[arg(long, allow_negative_numbers = true)]
        progress: Option<i64>,
    },
    /// Set task status
    Status {
        /// Task ID
        id: i64,
        /// New status (pending, in_progress, blocked, returned, completed)
        status: String,
        /// Progress percentage (clamped to 0-100)
        #[arg(long, allow_negative_numbers = true)]
        progress: Option<i64>,
    },
    /// Mark a task completed
    Done {
        /// Task ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum StageCommands {
    /// Operator override of a stage's status/progress/owner.
    /// The flow is recomputed right after, so computed values win.
    Set {
        /// Flow instance ID
        flow: i64,
        /// Stage name within the flow's template
        stage: String,
        /// Status override
        #[arg(long)]
        status: Option<String>,
        /// Progress override (clamped to 0-100)
        #[arg(long, allow_negative_numbers = true)]
        progress: Option<i64>,
        /// Owner override
        #[arg(long)]
        owner: Option<String>,
    },
}

/// Entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let conn = DbConnection::connect()?;
    dispatch(&conn, cli.command)
}

fn dispatch(conn: &Connection, command: Commands) -> Result<()> {
    match command {
        Commands::Template { subcommand } => match subcommand {
            TemplateCommands::Add {
                name,
                stages,
                description,
            } => handle_template_add(conn, &name, &stages, description.as_deref()),
            TemplateCommands::List { json } => handle_template_list(conn, json),
            TemplateCommands::Delete { template } => handle_template_delete(conn, &template),
        },
        Commands::Flow { subcommand } => match subcommand {
            FlowCommands::Create {
                name,
                template,
                kickoff,
                due,
            } => handle_flow_create(conn, &name, &template, kickoff.as_deref(), due.as_deref()),
            FlowCommands::List { json } => handle_flow_list(conn, json),
            FlowCommands::Show { id, json } => handle_flow_show(conn, id, json),
            FlowCommands::Recompute { id } => handle_flow_recompute(conn, id),
            FlowCommands::Delete { id } => handle_flow_delete(conn, id),
        },
        Commands::Task { subcommand } => match subcommand {
            TaskCommands::Add {
                title,
                flow,
                stage,
                deadline,
                owner,
            } => handle_task_add(
                conn,
                &title,
                flow,
                stage.as_deref(),
                deadline.as_deref(),
                owner.as_deref(),
            ),
            TaskCommands::List { flow, status, json } => {
                handle_task_list(conn, flow, status.as_deref(), json)
            }
            TaskCommands::Modify {
                id,
                title,
                deadline,
                stage,
                owner,
                progress,
            } => handle_task_modify(
                conn,
                id,
                title.as_deref(),
                deadline.as_deref(),
                stage.as_deref(),
                owner.as_deref(),
                progress,
            ),
            TaskCommands::Status {
                id,
                status,
                progress,
            } => handle_task_status(conn, id, &status, progress),
            TaskCommands::Done { id } => {
                handle_task_status(conn, id, "completed", None)
            }
        },
        Commands::Stage { subcommand } => match subcommand {
            StageCommands::Set {
                flow,
                stage,
                status,
                progress,
                owner,
            } => handle_stage_set(conn, flow, &stage, status.as_deref(), progress, owner.as_deref()),
        },
        Commands::Alerts { json } => handle_alerts(conn, json),
        Commands::Report => handle_report(conn),
    }
}

/// Run the aggregation engine for one flow instance
fn recompute(conn: &Connection, instance_id: i64) -> Result<RecomputeResult> {
    let mut store = SqliteStore::new(conn);
    Ok(progress::recompute_flow(&mut store, instance_id)?)
}

fn handle_template_add(
    conn: &Connection,
    name: &str,
    stages: &[String],
    description: Option<&str>,
) -> Result<()> {
    validate_template_name(name).map_err(anyhow::Error::msg)?;
    for stage in stages {
        validate_non_empty(stage, "Stage name").map_err(anyhow::Error::msg)?;
    }
    if TemplateRepo::get_by_name(conn, name)?.is_some() {
        anyhow::bail!("A template named '{}' already exists", name);
    }

    let template = TemplateRepo::create(conn, name, description, stages)?;
    println!(
        "Created template '{}' (id {}) with {} stage(s)",
        template.name,
        template.id.unwrap_or_default(),
        stages.len()
    );
    Ok(())
}

fn handle_template_list(conn: &Connection, json: bool) -> Result<()> {
    let templates = TemplateRepo::list_all(conn)?;

    if json {
        let mut entries = Vec::new();
        for template in &templates {
            let stages = TemplateRepo::stages(conn, template.id.unwrap_or_default())?;
            let stage_names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
            entries.push(serde_json::json!({
                "id": template.id,
                "name": template.name,
                "description": template.description,
                "stages": stage_names,
            }));
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if templates.is_empty() {
        println!("No templates found.");
        return Ok(());
    }
    for template in &templates {
        let stages = TemplateRepo::stages(conn, template.id.unwrap_or_default())?;
        let stage_names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        println!(
            "{:<4} {:<24} {}",
            template.id.unwrap_or_default(),
            template.name,
            stage_names.join(" > ")
        );
    }
    Ok(())
}

fn handle_template_delete(conn: &Connection, reference: &str) -> Result<()> {
    let template = TemplateRepo::resolve(conn, reference)?
        .ok_or_else(|| anyhow::anyhow!("No template found matching '{}'", reference))?;
    let id = template.id.unwrap_or_default();
    TemplateRepo::delete(conn, id)?;
    println!("Deleted template '{}'", template.name);
    Ok(())
}

fn handle_flow_create(
    conn: &Connection,
    name: &str,
    template_ref: &str,
    kickoff: Option<&str>,
    due: Option<&str>,
) -> Result<()> {
    validate_non_empty(name, "Flow name").map_err(anyhow::Error::msg)?;
    let template = TemplateRepo::resolve(conn, template_ref)?
        .ok_or_else(|| anyhow::anyhow!("No template found matching '{}'", template_ref))?;

    let kickoff_ts = kickoff.map(parse_date_expr).transpose()?;
    let due_ts = due.map(parse_date_expr).transpose()?;

    let instance = FlowRepo::create(
        conn,
        name,
        template.id.unwrap_or_default(),
        kickoff_ts,
        due_ts,
    )?;
    let stage_count = StageStatusRepo::list_for_instance(conn, instance.id.unwrap_or_default())?
        .len();

    println!(
        "Created flow '{}' (id {}) from template '{}' with {} stage(s)",
        instance.name,
        instance.id.unwrap_or_default(),
        template.name,
        stage_count
    );
    Ok(())
}

fn handle_flow_list(conn: &Connection, json: bool) -> Result<()> {
    let instances = FlowRepo::list_all(conn)?;

    let mut rows = Vec::new();
    for instance in instances {
        // Read path: derive state from the persisted stage summaries
        let statuses =
            StageStatusRepo::list_for_instance(conn, instance.id.unwrap_or_default())?;
        let state = classify_persisted(&statuses);
        rows.push((instance, state));
    }

    if json {
        let entries: Vec<_> = rows
            .iter()
            .map(|(flow, state)| {
                serde_json::json!({
                    "id": flow.id,
                    "name": flow.name,
                    "progress": flow.progress,
                    "health": flow.health.as_str(),
                    "state": state.as_str(),
                    "due_ts": flow.due_ts,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    print!("{}", output::format_flow_list(&rows));
    Ok(())
}

/// Pair each stage status of an instance with its template stage name
fn stages_with_names(
    conn: &Connection,
    template_id: i64,
    instance_id: i64,
) -> Result<Vec<(String, StageStatus)>> {
    let stages = TemplateRepo::stages(conn, template_id)?;
    let statuses = StageStatusRepo::list_for_instance(conn, instance_id)?;

    let mut rows = Vec::new();
    for status in statuses {
        let name = stages
            .iter()
            .find(|s| s.id == Some(status.stage_id))
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("stage {}", status.stage_id));
        rows.push((name, status));
    }
    Ok(rows)
}

fn handle_flow_show(conn: &Connection, id: i64, json: bool) -> Result<()> {
    let instance = FlowRepo::get_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("No flow instance found with id={}", id))?;
    let rows = stages_with_names(conn, instance.template_id, id)?;
    let statuses: Vec<StageStatus> = rows.iter().map(|(_, s)| s.clone()).collect();
    let state = classify_persisted(&statuses);

    if json {
        let stage_entries: Vec<_> = rows
            .iter()
            .map(|(name, status)| {
                serde_json::json!({
                    "stage": name,
                    "progress": status.progress,
                    "status": status.status.as_str(),
                    "owner": status.owner,
                })
            })
            .collect();
        let entry = serde_json::json!({
            "id": instance.id,
            "name": instance.name,
            "progress": instance.progress,
            "health": instance.health.as_str(),
            "state": state.as_str(),
            "kickoff_ts": instance.kickoff_ts,
            "due_ts": instance.due_ts,
            "stages": stage_entries,
        });
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    print!("{}", output::format_flow_detail(&instance, state, &rows));
    Ok(())
}

fn handle_flow_recompute(conn: &Connection, id: i64) -> Result<()> {
    let result = recompute(conn, id)?;
    print_rollup(&result);
    Ok(())
}

fn handle_flow_delete(conn: &Connection, id: i64) -> Result<()> {
    let instance = FlowRepo::get_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("No flow instance found with id={}", id))?;
    FlowRepo::delete(conn, id)?;
    println!("Deleted flow '{}' and its stages and tasks", instance.name);
    Ok(())
}

fn handle_task_add(
    conn: &Connection,
    title: &str,
    flow_id: i64,
    stage: Option<&str>,
    deadline: Option<&str>,
    owner: Option<&str>,
) -> Result<()> {
    validate_non_empty(title, "Task title").map_err(anyhow::Error::msg)?;
    if FlowRepo::get_by_id(conn, flow_id)?.is_none() {
        anyhow::bail!("No flow instance found with id={}", flow_id);
    }

    let stage_status_id = match stage {
        Some(stage_name) => {
            let status = StageStatusRepo::get_by_stage_name(conn, flow_id, stage_name)?
                .ok_or_else(|| {
                    anyhow::anyhow!("Flow {} has no stage named '{}'", flow_id, stage_name)
                })?;
            status.id
        }
        None => None,
    };
    let deadline_ts = deadline.map(parse_date_expr).transpose()?;

    let task = TaskRepo::create(conn, title, flow_id, stage_status_id, deadline_ts, owner)?;
    let result = recompute(conn, flow_id)?;

    println!("Created task {} '{}'", task.id.unwrap_or_default(), task.title);
    print_rollup(&result);
    Ok(())
}

fn handle_task_list(
    conn: &Connection,
    flow: Option<i64>,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let status = status
        .map(|s| parse_status_arg(s).map_err(anyhow::Error::msg))
        .transpose()?;

    let tasks = match flow {
        Some(flow_id) => {
            let all = TaskRepo::list_for_instance(conn, flow_id)?;
            match status {
                Some(status) => all.into_iter().filter(|t| t.status == status).collect(),
                None => all,
            }
        }
        None => TaskRepo::list_all(conn, status)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    print!("{}", output::format_task_list(&tasks));
    Ok(())
}

fn handle_task_modify(
    conn: &Connection,
    id: i64,
    title: Option<&str>,
    deadline: Option<&str>,
    stage: Option<&str>,
    owner: Option<&str>,
    progress: Option<i64>,
) -> Result<()> {
    let task = TaskRepo::get_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("No task found with id={}", id))?;

    if title.is_none() && deadline.is_none() && stage.is_none() && owner.is_none()
        && progress.is_none()
    {
        anyhow::bail!("Nothing to modify. Pass at least one of --title, --deadline, --stage, --owner, --progress.");
    }

    if let Some(title) = title {
        validate_non_empty(title, "Task title").map_err(anyhow::Error::msg)?;
    }
    let deadline_ts = deadline.map(parse_date_expr).transpose()?.map(Some);
    let stage_status_id = match stage {
        Some(stage_name) => {
            let status =
                StageStatusRepo::get_by_stage_name(conn, task.flow_instance_id, stage_name)?
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Flow {} has no stage named '{}'",
                            task.flow_instance_id,
                            stage_name
                        )
                    })?;
            Some(status.id)
        }
        None => None,
    };

    TaskRepo::update(conn, id, title, deadline_ts, stage_status_id, owner, progress)?;
    let result = recompute(conn, task.flow_instance_id)?;

    println!("Modified task {}", id);
    print_rollup(&result);
    Ok(())
}

fn handle_task_status(
    conn: &Connection,
    id: i64,
    status: &str,
    progress: Option<i64>,
) -> Result<()> {
    let status = parse_status_arg(status).map_err(anyhow::Error::msg)?;
    let task = TaskRepo::get_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("No task found with id={}", id))?;

    TaskRepo::set_status(conn, id, status, progress)?;
    let result = recompute(conn, task.flow_instance_id)?;

    println!("Task {} is now {}", id, status.as_str());
    print_rollup(&result);
    Ok(())
}

fn handle_stage_set(
    conn: &Connection,
    flow_id: i64,
    stage_name: &str,
    status: Option<&str>,
    progress: Option<i64>,
    owner: Option<&str>,
) -> Result<()> {
    if status.is_none() && progress.is_none() && owner.is_none() {
        anyhow::bail!("Nothing to set. Pass at least one of --status, --progress, --owner.");
    }
    if FlowRepo::get_by_id(conn, flow_id)?.is_none() {
        anyhow::bail!("No flow instance found with id={}", flow_id);
    }
    let stage_status = StageStatusRepo::get_by_stage_name(conn, flow_id, stage_name)?
        .ok_or_else(|| anyhow::anyhow!("Flow {} has no stage named '{}'", flow_id, stage_name))?;

    let status = status
        .map(|s| parse_status_arg(s).map_err(anyhow::Error::msg))
        .transpose()?;

    StageStatusRepo::apply_override(
        conn,
        stage_status.id.unwrap_or_default(),
        status,
        progress,
        owner,
    )?;

    // Overrides are transient: the recompute right after wins
    let result = recompute(conn, flow_id)?;
    println!("Updated stage '{}' of flow {}", stage_name, flow_id);
    print_rollup(&result);
    Ok(())
}

fn handle_alerts(conn: &Connection, json: bool) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let tasks = TaskRepo::alerts(conn, now)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No alerts. Nothing blocked, nothing overdue.");
        return Ok(());
    }
    print!("{}", output::format_task_list(&tasks));
    Ok(())
}

fn handle_report(conn: &Connection) -> Result<()> {
    let instances = FlowRepo::list_all(conn)?;
    let mut rows = Vec::new();
    for instance in instances {
        let statuses =
            StageStatusRepo::list_for_instance(conn, instance.id.unwrap_or_default())?;
        let state = classify_persisted(&statuses);
        rows.push((instance, state));
    }

    println!("OPFLOW REPORT");
    println!();
    println!("FLOWS");
    print!("{}", output::format_flow_list(&rows));
    println!();

    let counts = TaskRepo::count_by_status(conn)?;
    println!("TASKS: {}", output::format_status_summary(&counts));

    let completed = rows
        .iter()
        .filter(|(_, state)| *state == FlowState::Completed)
        .count();
    if !rows.is_empty() {
        println!("{} of {} flows completed", completed, rows.len());
    }
    Ok(())
}

fn print_rollup(result: &RecomputeResult) {
    println!(
        "Flow '{}': {} health={} state={}",
        result.flow.name,
        output::progress_bar(result.flow.progress),
        result.flow.health.as_str(),
        result.state.as_str()
    );
}
