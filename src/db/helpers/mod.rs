use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{PlanRunStatus, StudySource};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} value {value} is out of range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("failed to parse day '{value}'"))
}

pub fn parse_plan_status(value: &str) -> Result<PlanRunStatus> {
    match value {
        "Running" => Ok(PlanRunStatus::Running),
        "Completed" => Ok(PlanRunStatus::Completed),
        "Cancelled" => Ok(PlanRunStatus::Cancelled),
        "Interrupted" => Ok(PlanRunStatus::Interrupted),
        other => Err(anyhow!("unknown plan status {other}")),
    }
}

pub fn parse_source(value: &str) -> Result<StudySource> {
    match value {
        "Pomodoro" => Ok(StudySource::Pomodoro),
        "Manual" => Ok(StudySource::Manual),
        other => Err(anyhow!("unknown study source {other}")),
    }
}
