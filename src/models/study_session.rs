use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::StudyScope;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StudySource {
    /// A focus block finished by the Pomodoro timer.
    Pomodoro,
    /// Logged by hand with the study tracker stopwatch.
    Manual,
}

impl StudySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudySource::Pomodoro => "Pomodoro",
            StudySource::Manual => "Manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub scope: StudyScope,
    pub plan_id: Option<String>,
    pub source: StudySource,
    pub duration_secs: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudyTotals {
    pub total_secs: u64,
    pub total_minutes: u64,
    pub session_count: u64,
    pub pomodoro_blocks: u64,
}

/// Study time summed over one UTC calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStudyTotal {
    pub day: NaiveDate,
    pub total_secs: u64,
    pub session_count: u64,
}
