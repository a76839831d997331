use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_day, parse_source, to_i64, to_u64},
    Database,
};
use crate::models::{DailyStudyTotal, StudyScope, StudySession, StudyTotals};

fn row_to_study_session(row: &Row) -> Result<StudySession> {
    let room_id: String = row.get("room_id")?;
    let source: String = row.get("source")?;
    let recorded_at: String = row.get("recorded_at")?;

    Ok(StudySession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        scope: StudyScope::from_room_id(&room_id),
        plan_id: row.get("plan_id")?,
        source: parse_source(&source)?,
        duration_secs: to_u64(row.get("duration_secs")?, "duration_secs")?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
    })
}

impl Database {
    pub async fn insert_study_session(&self, session: &StudySession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO study_sessions (id, user_id, room_id, plan_id, source, duration_secs, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.user_id,
                    record.scope.as_room_id(),
                    record.plan_id,
                    record.source.as_str(),
                    to_i64(record.duration_secs)?,
                    record.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Newest first.
    pub async fn list_study_sessions(
        &self,
        user_id: &str,
        scope: &StudyScope,
        limit: usize,
    ) -> Result<Vec<StudySession>> {
        let user_id = user_id.to_string();
        let room_id = scope.as_room_id().to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, room_id, plan_id, source, duration_secs, recorded_at
                 FROM study_sessions
                 WHERE user_id = ?1 AND room_id = ?2
                 ORDER BY recorded_at DESC
                 LIMIT ?3",
            )?;
            let mut rows = stmt.query(params![user_id, room_id, limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_study_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn study_totals(&self, user_id: &str, scope: &StudyScope) -> Result<StudyTotals> {
        let user_id = user_id.to_string();
        let room_id = scope.as_room_id().to_string();
        self.execute(move |conn| {
            let (total_secs, session_count, pomodoro_blocks): (i64, i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(duration_secs), 0),
                        COUNT(*),
                        COALESCE(SUM(CASE WHEN source = 'Pomodoro' THEN 1 ELSE 0 END), 0)
                 FROM study_sessions
                 WHERE user_id = ?1 AND room_id = ?2",
                params![user_id, room_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let total_secs = to_u64(total_secs, "total_secs")?;
            Ok(StudyTotals {
                total_secs,
                total_minutes: total_secs / 60,
                session_count: to_u64(session_count, "session_count")?,
                pomodoro_blocks: to_u64(pomodoro_blocks, "pomodoro_blocks")?,
            })
        })
        .await
    }

    /// Per-day totals (UTC) from `since` onwards, oldest day first.
    pub async fn daily_study_totals(
        &self,
        user_id: &str,
        scope: &StudyScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyStudyTotal>> {
        let user_id = user_id.to_string();
        let room_id = scope.as_room_id().to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT substr(recorded_at, 1, 10) AS day,
                        SUM(duration_secs) AS total_secs,
                        COUNT(*) AS session_count
                 FROM study_sessions
                 WHERE user_id = ?1 AND room_id = ?2 AND recorded_at >= ?3
                 GROUP BY day
                 ORDER BY day ASC",
            )?;
            let mut rows = stmt.query(params![user_id, room_id, since.to_rfc3339()])?;
            let mut days = Vec::new();
            while let Some(row) = rows.next()? {
                let day: String = row.get("day")?;
                days.push(DailyStudyTotal {
                    day: parse_day(&day)?,
                    total_secs: to_u64(row.get("total_secs")?, "total_secs")?,
                    session_count: to_u64(row.get("session_count")?, "session_count")?,
                });
            }
            Ok(days)
        })
        .await
    }
}
