// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

use crate::types::{AppId, TaskId};

#[derive(Error, Debug)]
pub enum DepflowError {
    /// The request queue is closed; the analyser is gone or shutting down.
    #[error("request queue is closed")]
    QueueClosed,

    #[error("unknown application {0}")]
    UnknownApp(AppId),

    /// The application already received end-of-app.
    #[error("application {0} accepts no more requests")]
    AppEnded(AppId),

    #[error("malformed parameter: {0}")]
    MalformedParameter(String),

    /// A blocking wait exceeded its caller-supplied limit.
    #[error("wait timed out")]
    WaitTimeout,

    /// A main access targeted a datum whose producing task failed.
    #[error("producer task {0} failed")]
    ProducerFailed(TaskId),

    /// The analyser aborted; all pending waiters receive this.
    #[error("runtime aborted: {0}")]
    RuntimeAborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DepflowError>;
