use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlanRunStatus {
    Running,
    Completed,
    Cancelled,
    Interrupted,
}

impl PlanRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanRunStatus::Running => "Running",
            PlanRunStatus::Completed => "Completed",
            PlanRunStatus::Cancelled => "Cancelled",
            PlanRunStatus::Interrupted => "Interrupted",
        }
    }
}

/// Bookkeeping row for one focus plan, from `start_plan` until it finishes or is abandoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRun {
    pub id: String,
    pub user_id: String,
    pub room_id: String,
    pub goal_hours: u32,
    pub total_cycles: u32,
    pub cycles_completed: u32,
    pub status: PlanRunStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
