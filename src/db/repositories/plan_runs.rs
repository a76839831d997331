use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_optional_datetime, parse_plan_status, to_u32},
    Database,
};
use crate::models::{PlanRun, PlanRunStatus};

const PLAN_RUN_COLUMNS: &str = "id, user_id, room_id, goal_hours, total_cycles, cycles_completed, status, started_at, stopped_at, updated_at";

fn row_to_plan_run(row: &Row) -> Result<PlanRun> {
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(PlanRun {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        room_id: row.get("room_id")?,
        goal_hours: to_u32(row.get("goal_hours")?, "goal_hours")?,
        total_cycles: to_u32(row.get("total_cycles")?, "total_cycles")?,
        cycles_completed: to_u32(row.get("cycles_completed")?, "cycles_completed")?,
        status: parse_plan_status(&status)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_plan_run(&self, run: &PlanRun) -> Result<()> {
        let record = run.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO plan_runs (id, user_id, room_id, goal_hours, total_cycles, cycles_completed, status, started_at, stopped_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.user_id,
                    record.room_id,
                    record.goal_hours,
                    record.total_cycles,
                    record.cycles_completed,
                    record.status.as_str(),
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Counts one more finished focus block against a running plan. Returns
    /// false when no running plan has that id; the block itself is logged
    /// separately either way.
    pub async fn bump_plan_progress(
        &self,
        plan_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let plan_id = plan_id.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE plan_runs
                 SET cycles_completed = MIN(cycles_completed + 1, total_cycles),
                     updated_at = ?1
                 WHERE id = ?2 AND status = 'Running'",
                params![updated_at.to_rfc3339(), plan_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn mark_plan_status(
        &self,
        plan_id: &str,
        status: PlanRunStatus,
        cycles_completed: u32,
        stopped_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let plan_id = plan_id.to_string();
        self.execute(move |conn| {
            let updated_at = stopped_at.unwrap_or_else(Utc::now);
            conn.execute(
                "UPDATE plan_runs
                 SET status = ?1,
                     cycles_completed = ?2,
                     stopped_at = ?3,
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    cycles_completed,
                    stopped_at.map(|dt| dt.to_rfc3339()),
                    updated_at.to_rfc3339(),
                    plan_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_plan_run(&self, plan_id: &str) -> Result<Option<PlanRun>> {
        let plan_id = plan_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {PLAN_RUN_COLUMNS} FROM plan_runs WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let run = stmt
                .query_row(params![plan_id], |row| Ok(row_to_plan_run(row)))
                .optional()?
                .transpose()?;
            Ok(run)
        })
        .await
    }

    pub async fn get_running_plan_runs(&self) -> Result<Vec<PlanRun>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {PLAN_RUN_COLUMNS} FROM plan_runs WHERE status = 'Running' ORDER BY started_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut runs = Vec::new();
            while let Some(row) = rows.next()? {
                runs.push(row_to_plan_run(row)?);
            }
            Ok(runs)
        })
        .await
    }

    /// Marks plans left running by a previous process as interrupted and
    /// returns how many were touched.
    pub async fn interrupt_running_plans(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE plan_runs
                 SET status = 'Interrupted',
                     stopped_at = ?1,
                     updated_at = ?1
                 WHERE status = 'Running'",
                params![now.to_rfc3339()],
            )?;
            Ok(changed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(id: &str, started_at: DateTime<Utc>) -> PlanRun {
        PlanRun {
            id: id.into(),
            user_id: "user-1".into(),
            room_id: "personal".into(),
            goal_hours: 2,
            total_cycles: 4,
            cycles_completed: 0,
            status: PlanRunStatus::Running,
            started_at,
            stopped_at: None,
            updated_at: started_at,
        }
    }

    #[tokio::test]
    async fn plan_run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        db.insert_plan_run(&plan("p1", started)).await.unwrap();
        for _ in 0..3 {
            assert!(db.bump_plan_progress("p1", started).await.unwrap());
        }

        let run = db.get_plan_run("p1").await.unwrap().unwrap();
        assert_eq!(run.cycles_completed, 3);
        assert_eq!(run.status, PlanRunStatus::Running);

        let stopped = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap();
        db.mark_plan_status("p1", PlanRunStatus::Completed, 4, Some(stopped))
            .await
            .unwrap();
        let run = db.get_plan_run("p1").await.unwrap().unwrap();
        assert_eq!(run.status, PlanRunStatus::Completed);
        assert_eq!(run.cycles_completed, 4);
        assert_eq!(run.stopped_at, Some(stopped));

        assert!(db.get_plan_run("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn running_plans_are_interrupted_on_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        db.insert_plan_run(&plan("a", started)).await.unwrap();
        db.insert_plan_run(&plan("b", started)).await.unwrap();
        db.mark_plan_status("b", PlanRunStatus::Cancelled, 1, Some(started))
            .await
            .unwrap();

        assert_eq!(db.get_running_plan_runs().await.unwrap().len(), 1);
        assert_eq!(db.interrupt_running_plans(Utc::now()).await.unwrap(), 1);
        assert!(db.get_running_plan_runs().await.unwrap().is_empty());

        let a = db.get_plan_run("a").await.unwrap().unwrap();
        assert_eq!(a.status, PlanRunStatus::Interrupted);
        let b = db.get_plan_run("b").await.unwrap().unwrap();
        assert_eq!(b.status, PlanRunStatus::Cancelled);
    }

    #[tokio::test]
    async fn progress_only_moves_on_running_plans() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        assert!(!db.bump_plan_progress("nowhere", started).await.unwrap());

        db.insert_plan_run(&plan("c", started)).await.unwrap();
        db.mark_plan_status("c", PlanRunStatus::Cancelled, 1, Some(started))
            .await
            .unwrap();
        assert!(!db.bump_plan_progress("c", started).await.unwrap());

        let c = db.get_plan_run("c").await.unwrap().unwrap();
        assert_eq!(c.cycles_completed, 1);
        assert_eq!(c.status, PlanRunStatus::Cancelled);
    }
}
