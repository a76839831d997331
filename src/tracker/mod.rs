use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::Database,
    models::{Attribution, StudySession, StudySource, StudyTotals},
};

/// Manual "start studying / stop & save" stopwatch.
///
/// Only whole minutes are logged; a stint shorter than a minute is dropped.
pub struct StudyTracker {
    db: Database,
    attribution: Attribution,
    started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub is_studying: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl StudyTracker {
    pub fn new(db: Database, attribution: Attribution) -> Self {
        Self {
            db,
            attribution,
            started_at: None,
        }
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            is_studying: self.started_at.is_some(),
            started_at: self.started_at,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.start_at(Utc::now())
    }

    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.started_at.is_some() {
            bail!("already studying");
        }
        self.started_at = Some(now);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<Option<StudySession>> {
        self.stop_at(Utc::now()).await
    }

    /// Ends the stint and saves it. Returns `None` when nothing was running
    /// or the stint was under a minute.
    pub async fn stop_at(&mut self, now: DateTime<Utc>) -> Result<Option<StudySession>> {
        let Some(started_at) = self.started_at.take() else {
            return Ok(None);
        };

        let minutes = (now - started_at).num_minutes();
        if minutes <= 0 {
            info!("Discarding study stint shorter than a minute");
            return Ok(None);
        }

        let session = StudySession {
            id: Uuid::new_v4().to_string(),
            user_id: self.attribution.user_id.clone(),
            scope: self.attribution.scope.clone(),
            plan_id: None,
            source: StudySource::Manual,
            duration_secs: minutes as u64 * 60,
            recorded_at: now,
        };

        if let Err(err) = self.db.insert_study_session(&session).await {
            // Keep the stint so the caller can retry the save.
            self.started_at = Some(started_at);
            return Err(err);
        }

        info!(
            "Logged {} min of study for {} in {}",
            minutes,
            session.user_id,
            session.scope.as_room_id()
        );
        Ok(Some(session))
    }

    pub fn cancel(&mut self) {
        self.started_at = None;
    }

    pub async fn totals(&self) -> Result<StudyTotals> {
        self.db
            .study_totals(&self.attribution.user_id, &self.attribution.scope)
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn tracker(dir: &tempfile::TempDir) -> StudyTracker {
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();
        StudyTracker::new(db, Attribution::room("user-1", "room-1"))
    }

    #[tokio::test]
    async fn logs_whole_minutes() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker(&dir);
        let start = Utc::now();

        tracker.start_at(start).unwrap();
        assert!(tracker.status().is_studying);
        let session = tracker
            .stop_at(start + Duration::seconds(61 * 60 + 59))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.duration_secs, 61 * 60);
        assert_eq!(session.source, StudySource::Manual);
        assert!(!tracker.status().is_studying);

        let totals = tracker.totals().await.unwrap();
        assert_eq!(totals.total_minutes, 61);
        assert_eq!(totals.pomodoro_blocks, 0);
    }

    #[tokio::test]
    async fn short_stints_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker(&dir);
        let start = Utc::now();

        tracker.start_at(start).unwrap();
        let saved = tracker.stop_at(start + Duration::seconds(59)).await.unwrap();

        assert!(saved.is_none());
        assert_eq!(tracker.totals().await.unwrap().session_count, 0);
    }

    #[tokio::test]
    async fn double_start_is_rejected_and_cancel_discards() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker(&dir);
        let start = Utc::now();

        tracker.start_at(start).unwrap();
        assert!(tracker.start_at(start).is_err());
        tracker.cancel();

        assert!(tracker.stop_at(start + Duration::hours(1)).await.unwrap().is_none());
        assert_eq!(tracker.totals().await.unwrap().session_count, 0);
    }
}
