// src/access/mod.rs

//! The access processor: thread-safe front door of the runtime.
//!
//! Any number of application threads submit through a clone of
//! [`AccessProcessor`]; requests are serialized onto the analyser's bounded
//! queue. Submission errors (closed queue, unknown or ended application,
//! malformed parameters) are returned synchronously; blocking operations
//! wait on a one-shot reply the analyser fires.

pub mod request;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

pub use request::{MainAccess, Reply, Request, RequestKind};

use crate::errors::{DepflowError, Result};
use crate::graph::{GraphSnapshot, ParamValue, TaskDescription, TaskNode};
use crate::types::{AppId, DataRef, Direction, SyncStatus, TaskException, TaskId, TaskOutcome};

/// Applications the front door has seen, and those already ended.
///
/// Kept here so submission errors come back without a queue round-trip.
#[derive(Debug, Default)]
struct AppDirectory {
    seen: HashSet<AppId>,
    closed: HashSet<AppId>,
}

/// Thread-safe submission interface. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AccessProcessor {
    tx: mpsc::Sender<Request>,
    next_task_id: Arc<AtomicU64>,
    apps: Arc<Mutex<AppDirectory>>,
}

impl AccessProcessor {
    pub fn new(tx: mpsc::Sender<Request>) -> Self {
        Self {
            tx,
            next_task_id: Arc::new(AtomicU64::new(1)),
            apps: Arc::new(Mutex::new(AppDirectory::default())),
        }
    }

    /// Submit a new task. Returns the allocated id immediately; analysis
    /// and dispatch happen asynchronously.
    pub async fn submit_task(
        &self,
        app_id: AppId,
        description: TaskDescription,
    ) -> Result<TaskId> {
        self.submit(app_id, description, None).await
    }

    /// Submit a task forced to run after `enforcing`, regardless of data
    /// dependencies.
    pub async fn submit_enforced_task(
        &self,
        app_id: AppId,
        description: TaskDescription,
        enforcing: TaskId,
    ) -> Result<TaskId> {
        self.submit(app_id, description, Some(enforcing)).await
    }

    async fn submit(
        &self,
        app_id: AppId,
        description: TaskDescription,
        enforcing: Option<TaskId>,
    ) -> Result<TaskId> {
        validate_description(&description)?;
        {
            let mut apps = self.lock_apps();
            if apps.closed.contains(&app_id) {
                return Err(DepflowError::AppEnded(app_id));
            }
            apps.seen.insert(app_id);
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let mut task = TaskNode::new(task_id, app_id, description);
        task.enforcing_task = enforcing;

        self.send(Request::NewTask { task }).await?;
        debug!(task_id, app_id, "task submitted");
        Ok(task_id)
    }

    /// Access a datum from the application's main thread. Blocks until every
    /// producing task is terminal, then returns the current version.
    pub async fn main_access(
        &self,
        app_id: AppId,
        reference: DataRef,
        direction: Direction,
    ) -> Result<MainAccess> {
        self.main_access_wait(app_id, reference, direction, None).await
    }

    /// Like [`main_access`](Self::main_access) with an upper bound on the wait.
    pub async fn main_access_timeout(
        &self,
        app_id: AppId,
        reference: DataRef,
        direction: Direction,
        limit: Duration,
    ) -> Result<MainAccess> {
        self.main_access_wait(app_id, reference, direction, Some(limit))
            .await
    }

    async fn main_access_wait(
        &self,
        app_id: AppId,
        reference: DataRef,
        direction: Direction,
        limit: Option<Duration>,
    ) -> Result<MainAccess> {
        if direction.is_grouped() {
            return Err(DepflowError::MalformedParameter(
                "concurrent access modes are task-only".into(),
            ));
        }
        self.ensure_open(app_id)?;
        let (reply, rx) = oneshot::channel();
        self.send(Request::MainAccess {
            app_id,
            reference,
            direction,
            reply,
        })
        .await?;
        debug!(app_id, "waiting on main access");
        wait_reply(rx, limit).await
    }

    /// Report an execution outcome. Called by the dispatcher, once per
    /// launched execution. Never blocks on analysis.
    pub async fn task_ended(
        &self,
        task_id: TaskId,
        outcome: TaskOutcome,
        exception: Option<TaskException>,
    ) -> Result<()> {
        self.send(Request::TaskEnded {
            task_id,
            outcome,
            exception,
        })
        .await
    }

    /// Block until every task this application submitted so far is terminal.
    pub async fn barrier(&self, app_id: AppId) -> Result<SyncStatus> {
        self.barrier_wait(app_id, None).await
    }

    pub async fn barrier_timeout(&self, app_id: AppId, limit: Duration) -> Result<SyncStatus> {
        self.barrier_wait(app_id, Some(limit)).await
    }

    async fn barrier_wait(&self, app_id: AppId, limit: Option<Duration>) -> Result<SyncStatus> {
        self.ensure_open(app_id)?;
        let (reply, rx) = oneshot::channel();
        self.send(Request::Barrier { app_id, reply }).await?;
        debug!(app_id, "waiting on barrier");
        wait_reply(rx, limit).await
    }

    /// Declare that the application submits no further tasks and block until
    /// all of them are terminal. The application is destroyed afterwards;
    /// subsequent submissions fail.
    pub async fn end_of_app(&self, app_id: AppId) -> Result<SyncStatus> {
        self.end_of_app_wait(app_id, None).await
    }

    pub async fn end_of_app_timeout(&self, app_id: AppId, limit: Duration) -> Result<SyncStatus> {
        self.end_of_app_wait(app_id, Some(limit)).await
    }

    async fn end_of_app_wait(&self, app_id: AppId, limit: Option<Duration>) -> Result<SyncStatus> {
        {
            let mut apps = self.lock_apps();
            if !apps.seen.contains(&app_id) {
                return Err(DepflowError::UnknownApp(app_id));
            }
            if !apps.closed.insert(app_id) {
                return Err(DepflowError::AppEnded(app_id));
            }
        }
        let (reply, rx) = oneshot::channel();
        self.send(Request::EndOfApp { app_id, reply }).await?;
        info!(app_id, "waiting for application to end");
        wait_reply(rx, limit).await
    }

    /// Read-only view of the task graph, ordered by id.
    pub async fn snapshot(&self) -> Result<GraphSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Snapshot { reply }).await?;
        rx.await
            .map_err(|_| DepflowError::RuntimeAborted("analyser stopped before replying".into()))
    }

    /// Stop the analyser. Pending waiters are aborted; later submissions
    /// fail with a closed queue.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Request::Shutdown).await
    }

    /// Number of task ids allocated so far in this process.
    pub fn task_count(&self) -> u64 {
        self.next_task_id.load(Ordering::Relaxed).saturating_sub(1)
    }

    fn ensure_open(&self, app_id: AppId) -> Result<()> {
        let apps = self.lock_apps();
        if !apps.seen.contains(&app_id) {
            return Err(DepflowError::UnknownApp(app_id));
        }
        if apps.closed.contains(&app_id) {
            return Err(DepflowError::AppEnded(app_id));
        }
        Ok(())
    }

    fn lock_apps(&self) -> std::sync::MutexGuard<'_, AppDirectory> {
        self.apps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| DepflowError::QueueClosed)
    }
}

async fn wait_reply<T>(
    rx: oneshot::Receiver<Result<T>>,
    limit: Option<Duration>,
) -> Result<T> {
    match limit {
        None => flatten(rx.await),
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(inner) => flatten(inner),
            Err(_) => Err(DepflowError::WaitTimeout),
        },
    }
}

fn flatten<T>(received: std::result::Result<Result<T>, RecvError>) -> Result<T> {
    match received {
        Ok(inner) => inner,
        Err(_) => Err(DepflowError::RuntimeAborted(
            "analyser stopped before replying".into(),
        )),
    }
}

fn validate_description(description: &TaskDescription) -> Result<()> {
    if description.num_nodes == 0 {
        return Err(DepflowError::MalformedParameter(
            "numNodes must be at least one".into(),
        ));
    }
    for (position, parameter) in description.parameters.iter().enumerate() {
        match &parameter.value {
            ParamValue::Literal(_) if parameter.direction != Direction::In => {
                return Err(DepflowError::MalformedParameter(format!(
                    "literal parameter {position} must be IN"
                )));
            }
            ParamValue::Data(DataRef::File(path)) if path.as_os_str().is_empty() => {
                return Err(DepflowError::MalformedParameter(format!(
                    "parameter {position} has an empty file path"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
