use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOCUS_SECS: u32 = 25 * 60;
pub const DEFAULT_BREAK_SECS: u32 = 5 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Focus,
    Break,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Focus
    }
}

/// Coarse view of the controller for UI rendering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FocusStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

/// Focus and break lengths configured once per controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDurations {
    focus_secs: u32,
    break_secs: u32,
}

impl SessionDurations {
    pub fn new(focus_secs: u32, break_secs: u32) -> Result<Self> {
        if focus_secs == 0 {
            bail!("focus duration must be greater than zero");
        }
        if break_secs == 0 {
            bail!("break duration must be greater than zero");
        }
        Ok(Self {
            focus_secs,
            break_secs,
        })
    }

    pub fn focus_secs(&self) -> u32 {
        self.focus_secs
    }

    pub fn break_secs(&self) -> u32 {
        self.break_secs
    }

    pub fn for_phase(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus_secs,
            Phase::Break => self.break_secs,
        }
    }
}

impl Default for SessionDurations {
    fn default() -> Self {
        Self {
            focus_secs: DEFAULT_FOCUS_SECS,
            break_secs: DEFAULT_BREAK_SECS,
        }
    }
}

/// A study goal turned into a fixed number of focus blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub id: String,
    pub goal_hours: u32,
    /// Focus blocks required to finish the plan, two per goal hour.
    pub total_cycles: u32,
    pub focus_duration_secs: u32,
    pub break_duration_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub cycles_completed: u32,
    pub is_running: bool,
    pub is_active: bool,
}

impl SessionState {
    pub fn idle(durations: &SessionDurations) -> Self {
        Self {
            phase: Phase::Focus,
            seconds_remaining: durations.focus_secs(),
            cycles_completed: 0,
            is_running: false,
            is_active: false,
        }
    }
}

/// Everything a subscriber needs to render the timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSnapshot {
    pub status: FocusStatus,
    pub state: SessionState,
    pub plan: Option<SessionPlan>,
    pub total_cycles: u32,
    pub hour_in_progress: u32,
}
