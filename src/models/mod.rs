pub mod identity;
pub mod plan_run;
pub mod study_session;

pub use identity::{Attribution, StudyScope, PERSONAL_SCOPE};
pub use plan_run::{PlanRun, PlanRunStatus};
pub use study_session::{DailyStudyTotal, StudySession, StudySource, StudyTotals};
