use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Attribution;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusBlockCompleted {
    pub attribution: Attribution,
    pub plan_id: String,
    pub duration_secs: u32,
    pub completed_at: DateTime<Utc>,
}

/// Side effects of controller transitions, returned in the order they happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FocusEvent {
    #[serde(rename_all = "camelCase")]
    PlanStarted {
        attribution: Attribution,
        plan_id: String,
        goal_hours: u32,
        total_cycles: u32,
        started_at: DateTime<Utc>,
    },
    FocusBlockCompleted(FocusBlockCompleted),
    #[serde(rename_all = "camelCase")]
    PlanCompleted {
        attribution: Attribution,
        plan_id: String,
        cycles_completed: u32,
        completed_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    PlanAbandoned {
        attribution: Attribution,
        plan_id: String,
        cycles_completed: u32,
        abandoned_at: DateTime<Utc>,
    },
}

impl FocusEvent {
    pub fn plan_id(&self) -> &str {
        match self {
            FocusEvent::PlanStarted { plan_id, .. }
            | FocusEvent::PlanCompleted { plan_id, .. }
            | FocusEvent::PlanAbandoned { plan_id, .. } => plan_id,
            FocusEvent::FocusBlockCompleted(block) => &block.plan_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FocusEvent::PlanStarted { .. } => "plan-started",
            FocusEvent::FocusBlockCompleted(_) => "focus-block-completed",
            FocusEvent::PlanCompleted { .. } => "plan-completed",
            FocusEvent::PlanAbandoned { .. } => "plan-abandoned",
        }
    }
}

/// Receives controller events. Delivery is fire-and-forget: a sink that fails
/// to persist must report it on its own and never push back into the timer.
pub trait FocusEventSink: Send + Sync {
    fn dispatch(&self, event: FocusEvent);
}

/// Sink that drops everything, for hosts that only need the countdown.
pub struct NoopSink;

impl FocusEventSink for NoopSink {
    fn dispatch(&self, _event: FocusEvent) {}
}
