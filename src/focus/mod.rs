pub mod controller;
pub mod events;
pub mod state;
pub mod timer;

pub use controller::FocusSessionController;
pub use events::{FocusBlockCompleted, FocusEvent, FocusEventSink, NoopSink};
pub use state::{
    FocusSnapshot, FocusStatus, Phase, SessionDurations, SessionPlan, SessionState,
    DEFAULT_BREAK_SECS, DEFAULT_FOCUS_SECS,
};
pub use timer::FocusTimer;
