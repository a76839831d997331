//! The study log: one SQLite file per data directory, owned by a worker thread.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
mod repositories;

use migrations::run_migrations;

pub const DATABASE_FILE: &str = "studyroom.sqlite3";

const WRITER_THREAD: &str = "studyroom-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

struct Writer {
    /// `None` once the log is closing; the worker exits when the channel drains.
    tasks: Mutex<Option<mpsc::Sender<DbTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Writer {
    fn sender(&self) -> Result<mpsc::Sender<DbTask>> {
        let guard = self
            .tasks
            .lock()
            .map_err(|_| anyhow!("study log writer lock poisoned"))?;
        guard
            .clone()
            .ok_or_else(|| anyhow!("study log is closed"))
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let tasks = match self.tasks.get_mut() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(tasks.take());

        let worker = match self.worker.get_mut() {
            Ok(worker) => worker,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = worker.take() {
            if let Err(join_err) = handle.join() {
                error!("Study log writer panicked: {join_err:?}");
            }
        }
    }
}

/// Handle to the SQLite study log. Cloning is cheap; every clone talks to
/// the same connection owned by a dedicated worker thread.
#[derive(Clone)]
pub struct Database {
    writer: Arc<Writer>,
    db_path: Arc<PathBuf>,
}

impl Database {
    /// Opens the study log kept in a room's data directory.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::new(data_dir.join(DATABASE_FILE))
    }

    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create study log directory {}", parent.display())
            })?;
        }

        let (task_tx, task_rx) = mpsc::channel::<DbTask>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path = db_path.clone();

        let worker = thread::Builder::new()
            .name(WRITER_THREAD.into())
            .spawn(move || run_writer(&path, task_rx, ready_tx))
            .context("failed to spawn study log writer thread")?;

        let version = ready_rx
            .recv()
            .context("study log writer exited before it was ready")??;

        info!(
            "Study log (schema v{version}) opened at {}",
            db_path.display()
        );

        Ok(Self {
            writer: Arc::new(Writer {
                tasks: Mutex::new(Some(task_tx)),
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn schema_version(&self) -> Result<i32> {
        self.execute(|conn| {
            Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
        })
        .await
    }

    /// Runs `task` on the writer thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let task: DbTask = Box::new(move |conn| {
            // The caller may have given up waiting; the write still stands.
            let _ = reply_tx.send(task(conn));
        });

        self.writer
            .sender()?
            .send(task)
            .map_err(|_| anyhow!("study log writer has stopped"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("study log writer stopped before replying"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open study log {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode on the study log: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set study log busy timeout")?;

    run_migrations(&mut conn).context("failed to migrate study log")?;
    Ok(conn)
}

/// Body of the writer thread: reports readiness (the schema version or the
/// open error), then runs tasks until every sender is gone.
fn run_writer(
    path: &Path,
    tasks: mpsc::Receiver<DbTask>,
    ready: mpsc::Sender<Result<i32>>,
) {
    let opened = open_connection(path).and_then(|conn| {
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("failed to read study log schema version")?;
        Ok((conn, version))
    });

    let mut conn = match opened {
        Ok((conn, version)) => {
            if ready.send(Ok(version)).is_err() {
                return;
            }
            conn
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    for task in tasks {
        task(&mut conn);
    }

    info!("Study log writer shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_parent_directories_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let db = Database::open_in(&data_dir).unwrap();
        assert_eq!(db.path(), data_dir.join(DATABASE_FILE).as_path());
        assert_eq!(
            db.schema_version().await.unwrap(),
            migrations::CURRENT_SCHEMA_VERSION
        );
    }

    #[tokio::test]
    async fn reopening_an_existing_database_is_a_no_op_migration() {
        let dir = tempfile::tempdir().unwrap();

        drop(Database::open_in(dir.path()).unwrap());
        let db = Database::open_in(dir.path()).unwrap();

        let tables: i64 = db
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('plan_runs', 'study_sessions')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[tokio::test]
    async fn unreadable_path_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the database file should be.
        std::fs::create_dir_all(dir.path().join(DATABASE_FILE)).unwrap();

        assert!(Database::open_in(dir.path()).is_err());
    }

    #[tokio::test]
    async fn sessions_from_a_v1_log_survive_the_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DATABASE_FILE);
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(include_str!("schemas/schema_v1.sql")).unwrap();
            conn.execute_batch(
                "INSERT INTO study_sessions (id, user_id, room_id, plan_id, duration_secs, recorded_at)
                 VALUES ('s-1', 'user-1', 'personal', NULL, 1800, '2024-03-01T10:00:00+00:00');
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let db = Database::new(path).unwrap();
        let (plan_fks, source): (i64, String) = db
            .execute(|conn| {
                let fks: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM pragma_foreign_key_list('study_sessions')",
                    [],
                    |row| row.get(0),
                )?;
                let source: String = conn.query_row(
                    "SELECT source FROM study_sessions WHERE id = 's-1'",
                    [],
                    |row| row.get(0),
                )?;
                Ok((fks, source))
            })
            .await
            .unwrap();
        assert_eq!(plan_fks, 0);
        assert_eq!(source, "Manual");
    }
}
