// Date expression parsing for deadlines and kickoff/due dates

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use anyhow::Result;

/// Parse a date expression and return Unix timestamp (UTC)
///
/// Supported forms: `2026-01-10`, `2026-01-10T14:30`, `today`, `tomorrow`,
/// and `+Nd` for N days from now.
pub fn parse_date_expr(expr: &str) -> Result<i64> {
    // Absolute dates: 2026-01-10, 2026-01-10T14:30
    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        let datetime = date.and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
        let local_dt = Local.from_local_datetime(&datetime)
            .single()
            .ok_or_else(|| anyhow::anyhow!("Ambiguous date"))?;
        return Ok(local_dt.timestamp());
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(expr, "%Y-%m-%dT%H:%M") {
        let local_dt = Local.from_local_datetime(&datetime)
            .single()
            .ok_or_else(|| anyhow::anyhow!("Ambiguous datetime"))?;
        return Ok(local_dt.timestamp());
    }

    // Offsets in days: +3d
    if let Some(days) = expr.strip_prefix('+').and_then(|rest| rest.strip_suffix('d')) {
        let days: i64 = days.parse()
            .map_err(|_| anyhow::anyhow!("Invalid day offset: {}", expr))?;
        return Ok(chrono::Utc::now().timestamp() + days * 86400);
    }

    // Relative dates: today, tomorrow
    let now = Local::now();
    match expr {
        "today" => {
            let today = now.date_naive().and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
            let local_dt = Local.from_local_datetime(&today)
                .single()
                .ok_or_else(|| anyhow::anyhow!("Ambiguous date"))?;
            Ok(local_dt.timestamp())
        }
        "tomorrow" => {
            let tomorrow = (now.date_naive() + chrono::Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
            let local_dt = Local.from_local_datetime(&tomorrow)
                .single()
                .ok_or_else(|| anyhow::anyhow!("Ambiguous date"))?;
            Ok(local_dt.timestamp())
        }
        _ => {
            anyhow::bail!("Unsupported date expression: {}. Use YYYY-MM-DD, YYYY-MM-DDTHH:MM, today, tomorrow, or +Nd.", expr)
        }
    }
}

/// Format a Unix timestamp as a local date string
pub fn format_date(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => String::from("?"),
    }
}
