use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Joins the connection thread once the last [`Database`] clone is gone.
struct ThreadGuard(Option<JoinHandle<()>>);

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            if handle.join().is_err() {
                error!("database thread panicked");
            }
        }
    }
}

/// SQLite handle. The connection lives on one dedicated thread; async
/// callers hand it closures through [`Database::execute`].
#[derive(Clone)]
pub struct Database {
    // Declared before `_thread` so the last clone closes the job channel
    // before joining.
    jobs: mpsc::Sender<Job>,
    _thread: Arc<ThreadGuard>,
    path: Arc<PathBuf>,
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;

    for (pragma, value) in [("journal_mode", "WAL"), ("foreign_keys", "ON")] {
        if let Err(err) = conn.pragma_update(None, pragma, value) {
            warn!("could not set {pragma}={value}: {err}");
        }
    }

    run_migrations(&mut conn).context("failed to migrate database")?;
    Ok(conn)
}

impl Database {
    /// Opens (or creates) the database at `path` and migrates it.
    /// `":memory:"` gives a private in-memory database.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (jobs, job_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name("posture-ai-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                // Ends when every sender is dropped.
                for job in job_rx {
                    job(&mut conn);
                }
                debug!("database thread for {} exiting", thread_path.display());
            })
            .context("failed to spawn database thread")?;

        ready_rx
            .recv()
            .context("database thread exited during startup")??;
        info!("database ready at {}", path.display());

        Ok(Self {
            jobs,
            _thread: Arc::new(ThreadGuard(Some(handle))),
            path: Arc::new(path),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` on the connection thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // A caller that stopped waiting just loses the result.
            let _ = reply_tx.send(task(conn));
        });

        self.jobs
            .send(job)
            .map_err(|_| anyhow!("database thread has stopped"))?;
        reply_rx
            .await
            .context("database thread dropped the request")?
    }
}
