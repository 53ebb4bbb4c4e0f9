// src/access/request.rs

//! The tagged request type flowing through the analyser queue.
//!
//! Every state-mutating operation travels as one of these variants; the
//! analyser dispatches exhaustively on the tag. Blocking operations carry a
//! one-shot reply sender that the analyser fires exactly once.

use tokio::sync::oneshot;

use crate::errors::Result;
use crate::graph::{GraphSnapshot, TaskNode};
use crate::types::{AppId, DataId, DataRef, DataVersion, Direction, SyncStatus, TaskException, TaskId, TaskOutcome};

/// One-shot completion signal fired by the analyser.
pub type Reply<T> = oneshot::Sender<T>;

/// Result of a main-thread data access, delivered once every producer of
/// the datum is terminal.
#[derive(Debug, Clone)]
pub struct MainAccess {
    pub data_id: DataId,
    /// The normalized reference, usable as a file handle for FILE data.
    pub reference: DataRef,
    pub version: DataVersion,
}

pub enum Request {
    NewTask {
        task: TaskNode,
    },
    MainAccess {
        app_id: AppId,
        reference: DataRef,
        direction: Direction,
        reply: Reply<Result<MainAccess>>,
    },
    TaskEnded {
        task_id: TaskId,
        outcome: TaskOutcome,
        exception: Option<TaskException>,
    },
    Barrier {
        app_id: AppId,
        reply: Reply<Result<SyncStatus>>,
    },
    EndOfApp {
        app_id: AppId,
        reply: Reply<Result<SyncStatus>>,
    },
    Snapshot {
        reply: Reply<GraphSnapshot>,
    },
    Shutdown,
}

/// Request tag, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    NewTask,
    MainAccess,
    TaskEnded,
    Barrier,
    EndOfApp,
    Snapshot,
    Shutdown,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::NewTask { .. } => RequestKind::NewTask,
            Request::MainAccess { .. } => RequestKind::MainAccess,
            Request::TaskEnded { .. } => RequestKind::TaskEnded,
            Request::Barrier { .. } => RequestKind::Barrier,
            Request::EndOfApp { .. } => RequestKind::EndOfApp,
            Request::Snapshot { .. } => RequestKind::Snapshot,
            Request::Shutdown => RequestKind::Shutdown,
        }
    }

    /// Attach a user-domain exception to this request.
    ///
    /// Only new-task and task-ended requests carry exceptions.
    pub fn set_exception(&mut self, exc: TaskException) {
        match self {
            Request::NewTask { task } => task.exception = Some(exc),
            Request::TaskEnded { exception, .. } => *exception = Some(exc),
            Request::EndOfApp { .. } => {
                // EndOfApp does not support exceptions.
            }
            _ => {}
        }
    }

    pub fn exception(&self) -> Option<&TaskException> {
        match self {
            Request::NewTask { task } => task.exception.as_ref(),
            Request::TaskEnded { exception, .. } => exception.as_ref(),
            _ => None,
        }
    }
}
