pub mod db;
pub mod focus;
pub mod models;
pub mod recorder;
pub mod settings;
pub mod tracker;
mod utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::Mutex;

pub use db::Database;
pub use focus::{
    FocusEvent, FocusEventSink, FocusSessionController, FocusSnapshot, FocusStatus, FocusTimer,
    Phase, SessionDurations,
};
pub use models::{Attribution, StudyScope};
pub use recorder::StudyLogRecorder;
pub use settings::{FocusSettings, SettingsStore};
pub use tracker::StudyTracker;

const SETTINGS_FILE: &str = "settings.json";

/// Initializes `env_logger` from `RUST_LOG`, defaulting to info.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

/// Everything one signed-in user needs inside one room (or their personal space).
pub struct StudyRoom {
    pub db: Database,
    pub timer: FocusTimer,
    pub tracker: Mutex<StudyTracker>,
    pub settings: SettingsStore,
    recorder: Arc<StudyLogRecorder>,
    attribution: Attribution,
}

impl StudyRoom {
    /// Opens (or creates) the study log in `data_dir` and wires the timer to it.
    /// Must be called from within a tokio runtime.
    pub async fn open(data_dir: &Path, attribution: Attribution) -> Result<Self> {
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("failed to create data directory {}", data_dir.display())
        })?;

        let database = Database::open_in(data_dir)?;

        // Plans still marked running belong to a process that died mid-plan.
        for run in database.get_running_plan_runs().await? {
            warn!(
                "Recovered unfinished plan {} ({}/{} blocks); marking as Interrupted",
                run.id, run.cycles_completed, run.total_cycles
            );
        }
        database.interrupt_running_plans(Utc::now()).await?;

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let focus_settings = settings.focus()?;

        let recorder = Arc::new(StudyLogRecorder::spawn(database.clone()));
        let controller =
            FocusSessionController::new(attribution.clone(), focus_settings.durations()?);
        let timer = FocusTimer::with_tick_interval(
            controller,
            recorder.clone(),
            focus_settings.tick_interval(),
        );
        let tracker = StudyTracker::new(database.clone(), attribution.clone());

        info!(
            "Study room ready for {} in {}",
            attribution.user_id,
            attribution.scope.as_room_id()
        );

        Ok(Self {
            db: database,
            timer,
            tracker: Mutex::new(tracker),
            settings,
            recorder,
            attribution,
        })
    }

    pub fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    pub async fn study_totals(&self) -> Result<models::StudyTotals> {
        self.db
            .study_totals(&self.attribution.user_id, &self.attribution.scope)
            .await
    }

    /// Stops ticking and flushes queued study log writes. Timer state is left
    /// as is; a running plan stays Running in the log and is recovered as
    /// Interrupted on the next open.
    pub async fn shutdown(&self) -> Result<()> {
        self.timer.stop_ticking().await;
        self.recorder.shutdown().await
    }
}
