//! Persists focus timer events to the study log.
//!
//! The timer hands events over through [`FocusEventSink::dispatch`], which only
//! enqueues. A background task drains the queue into the database, so a slow
//! or failing write never reaches the timer.

use anyhow::{Context, Result};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::Database,
    focus::{FocusEvent, FocusEventSink},
    models::{PlanRun, PlanRunStatus, StudySession, StudySource},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub struct StudyLogRecorder {
    sender: mpsc::UnboundedSender<FocusEvent>,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StudyLogRecorder {
    /// Starts the writer task. Must be called from within a tokio runtime.
    pub fn spawn(db: Database) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(recorder_loop(db, receiver, cancel_token.clone()));

        Self {
            sender,
            cancel_token,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Writes whatever is already queued, then stops the writer task.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();

        if let Some(handle) = self.handle.lock().await.take() {
            handle.await.context("study log recorder task failed to join")?;
        }
        Ok(())
    }
}

impl FocusEventSink for StudyLogRecorder {
    fn dispatch(&self, event: FocusEvent) {
        if let Err(err) = self.sender.send(event) {
            log_warn!(
                "study log recorder is stopped, dropping {} for plan {}",
                err.0.name(),
                err.0.plan_id()
            );
        }
    }
}

async fn recorder_loop(
    db: Database,
    mut receiver: mpsc::UnboundedReceiver<FocusEvent>,
    cancel_token: CancellationToken,
) {
    log_info!("study log recorder started");

    loop {
        tokio::select! {
            biased;
            maybe_event = receiver.recv() => match maybe_event {
                Some(event) => persist_logged(&db, event).await,
                None => break,
            },
            _ = cancel_token.cancelled() => {
                receiver.close();
                while let Some(event) = receiver.recv().await {
                    persist_logged(&db, event).await;
                }
                break;
            }
        }
    }

    log_info!("study log recorder shutting down");
}

async fn persist_logged(db: &Database, event: FocusEvent) {
    let name = event.name();
    let plan_id = event.plan_id().to_string();
    match persist(db, event).await {
        Ok(()) => log_debug!("recorded {name} for plan {plan_id}"),
        Err(err) => log_error!("failed to record {name} for plan {plan_id}: {err:?}"),
    }
}

async fn persist(db: &Database, event: FocusEvent) -> Result<()> {
    match event {
        FocusEvent::PlanStarted {
            attribution,
            plan_id,
            goal_hours,
            total_cycles,
            started_at,
        } => {
            let run = PlanRun {
                id: plan_id,
                user_id: attribution.user_id,
                room_id: attribution.scope.as_room_id().to_string(),
                goal_hours,
                total_cycles,
                cycles_completed: 0,
                status: PlanRunStatus::Running,
                started_at,
                stopped_at: None,
                updated_at: started_at,
            };
            db.insert_plan_run(&run)
                .await
                .context("failed to insert plan run")
        }
        FocusEvent::FocusBlockCompleted(block) => {
            let session = StudySession {
                id: Uuid::new_v4().to_string(),
                user_id: block.attribution.user_id,
                scope: block.attribution.scope,
                plan_id: Some(block.plan_id.clone()),
                source: StudySource::Pomodoro,
                duration_secs: u64::from(block.duration_secs),
                recorded_at: block.completed_at,
            };
            db.insert_study_session(&session)
                .await
                .context("failed to insert focus block")?;
            let bumped = db
                .bump_plan_progress(&block.plan_id, block.completed_at)
                .await
                .context("failed to update plan progress")?;
            if !bumped {
                log_warn!(
                    "focus block logged but plan {} is not running in the study log",
                    block.plan_id
                );
            }
            Ok(())
        }
        FocusEvent::PlanCompleted {
            plan_id,
            cycles_completed,
            completed_at,
            ..
        } => db
            .mark_plan_status(
                &plan_id,
                PlanRunStatus::Completed,
                cycles_completed,
                Some(completed_at),
            )
            .await
            .context("failed to mark plan completed"),
        FocusEvent::PlanAbandoned {
            plan_id,
            cycles_completed,
            abandoned_at,
            ..
        } => db
            .mark_plan_status(
                &plan_id,
                PlanRunStatus::Cancelled,
                cycles_completed,
                Some(abandoned_at),
            )
            .await
            .context("failed to mark plan cancelled"),
    }
}
