// Output formatting utilities

use crate::models::{FlowHealth, FlowInstance, FlowState, StageStatus, Task, TaskStatus};
use crate::utils::format_date;
use std::io::IsTerminal;

// ANSI escape codes for terminal formatting
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";

const ANSI_FG_RED: &str = "\x1b[31m";
const ANSI_FG_GREEN: &str = "\x1b[32m";
const ANSI_FG_YELLOW: &str = "\x1b[33m";
const ANSI_FG_BLUE: &str = "\x1b[34m";
const ANSI_FG_MAGENTA: &str = "\x1b[35m";
const ANSI_FG_BRIGHT_BLACK: &str = "\x1b[90m";

/// Whether output should carry ANSI colors
fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

fn colored(text: &str, color: &str) -> String {
    if use_color() {
        format!("{}{}{}", color, text, ANSI_RESET)
    } else {
        text.to_string()
    }
}

fn bold(text: &str) -> String {
    colored(text, ANSI_BOLD)
}

/// Detect terminal width, falling back to 80 columns
fn terminal_width() -> usize {
    if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size() {
        w as usize
    } else {
        80
    }
}

/// Truncate a string to fit a column, appending an ellipsis when cut
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else if max > 1 {
        let cut: String = text.chars().take(max - 1).collect();
        format!("{}…", cut)
    } else {
        text.chars().take(max).collect()
    }
}

/// Color a task status for display
pub fn format_status(status: TaskStatus) -> String {
    let color = match status {
        TaskStatus::Pending => ANSI_FG_BRIGHT_BLACK,
        TaskStatus::InProgress => ANSI_FG_BLUE,
        TaskStatus::Blocked => ANSI_FG_RED,
        TaskStatus::Returned => ANSI_FG_MAGENTA,
        TaskStatus::Completed => ANSI_FG_GREEN,
    };
    colored(status.as_str(), color)
}

/// Color a flow health for display
pub fn format_health(health: FlowHealth) -> String {
    let color = match health {
        FlowHealth::OnTrack => ANSI_FG_GREEN,
        FlowHealth::AtRisk => ANSI_FG_RED,
        FlowHealth::Delayed => ANSI_FG_YELLOW,
    };
    colored(health.as_str(), color)
}

/// Color a lifecycle state for display
pub fn format_state(state: FlowState) -> String {
    let color = match state {
        FlowState::NotStarted => ANSI_FG_BRIGHT_BLACK,
        FlowState::InProgress => ANSI_FG_BLUE,
        FlowState::Completed => ANSI_FG_GREEN,
    };
    colored(state.as_str(), color)
}

/// Render a ten-slot progress bar: [====------] 40%
pub fn progress_bar(progress: i64) -> String {
    let filled = (progress / 10).clamp(0, 10) as usize;
    format!(
        "[{}{}] {:>3}%",
        "=".repeat(filled),
        "-".repeat(10 - filled),
        progress
    )
}

/// Format the flow instance list as a table
pub fn format_flow_list(flows: &[(FlowInstance, FlowState)]) -> String {
    if flows.is_empty() {
        return "No flows found.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&bold(&format!(
        "{:<4} {:<24} {:<18} {:<10} {:<12} {}\n",
        "ID", "NAME", "PROGRESS", "HEALTH", "STATE", "DUE"
    )));

    let name_width = 24.min(terminal_width().saturating_sub(56).max(12));
    for (flow, state) in flows {
        let due = flow.due_ts.map(format_date).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<4} {:<24} {:<18} {:<10} {:<12} {}\n",
            flow.id.unwrap_or_default(),
            truncate(&flow.name, name_width),
            progress_bar(flow.progress),
            format_health(flow.health),
            format_state(*state),
            due
        ));
    }
    out
}

/// Format one flow instance with its stage table
pub fn format_flow_detail(
    flow: &FlowInstance,
    state: FlowState,
    stages: &[(String, StageStatus)],
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} (id {})\n",
        bold(&flow.name),
        flow.id.unwrap_or_default()
    ));
    out.push_str(&format!(
        "  progress: {}   health: {}   state: {}\n",
        progress_bar(flow.progress),
        format_health(flow.health),
        format_state(state)
    ));
    if let Some(kickoff) = flow.kickoff_ts {
        out.push_str(&format!("  kickoff:  {}\n", format_date(kickoff)));
    }
    if let Some(due) = flow.due_ts {
        out.push_str(&format!("  due:      {}\n", format_date(due)));
    }

    if stages.is_empty() {
        out.push_str("\n  (no stages defined)\n");
        return out;
    }

    out.push('\n');
    out.push_str(&bold(&format!(
        "  {:<20} {:<18} {:<12} {}\n",
        "STAGE", "PROGRESS", "STATUS", "OWNER"
    )));
    for (stage_name, status) in stages {
        out.push_str(&format!(
            "  {:<20} {:<18} {:<12} {}\n",
            truncate(stage_name, 20),
            progress_bar(status.progress),
            format_status(status.status),
            status.owner.as_deref().unwrap_or("-")
        ));
    }
    out
}

/// Format a task list as a table
pub fn format_task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&bold(&format!(
        "{:<4} {:<32} {:<12} {:<6} {:<6} {:<12} {}\n",
        "ID", "TITLE", "STATUS", "PROG", "FLOW", "DEADLINE", "OWNER"
    )));

    let title_width = 32.min(terminal_width().saturating_sub(48).max(16));
    for task in tasks {
        let deadline = task
            .deadline_ts
            .map(format_date)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<4} {:<32} {:<12} {:<6} {:<6} {:<12} {}\n",
            task.id.unwrap_or_default(),
            truncate(&task.title, title_width),
            format_status(task.status),
            format!("{}%", task.progress),
            task.flow_instance_id,
            deadline,
            task.owner.as_deref().unwrap_or("-")
        ));
    }
    out
}

/// Format the report header line for a task status summary
pub fn format_status_summary(counts: &[(TaskStatus, i64)]) -> String {
    if counts.is_empty() {
        return "no tasks yet".to_string();
    }
    counts
        .iter()
        .map(|(status, count)| format!("{} {}", count, format_status(*status)))
        .collect::<Vec<_>>()
        .join(", ")
}
