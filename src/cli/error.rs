// Error handling utilities for consistent error messages and exit codes

use crate::models::TaskStatus;

/// Validate that a string is not empty
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", field_name))
    } else {
        Ok(())
    }
}

/// Validate that an ID is valid (positive integer)
pub fn validate_id(id_str: &str, entity: &str) -> Result<i64, String> {
    id_str.parse::<i64>()
        .map_err(|_| format!("Invalid {} ID: '{}'. ID must be a number.", entity, id_str))
        .and_then(|id| {
            if id > 0 {
                Ok(id)
            } else {
                Err(format!("Invalid {} ID: {}. ID must be positive.", entity, id))
            }
        })
}

/// Parse a task status argument, with the valid values in the error message
pub fn parse_status_arg(value: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_str(value).ok_or_else(|| {
        format!(
            "Invalid status: '{}'. Valid statuses: pending, in_progress, blocked, returned, completed.",
            value
        )
    })
}

/// Validate template name format (alphanumeric, dots, underscores, hyphens)
pub fn validate_template_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Template name cannot be empty".to_string());
    }

    if name.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(format!("Invalid template name: '{}'. Template names can only contain letters, numbers, dots, underscores, and hyphens.", name))
    }
}
