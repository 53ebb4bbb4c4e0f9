// src/lib.rs

//! Core of a task-based runtime: a dependency-tracking scheduler.
//!
//! Applications submit tasks whose parameters declare access modes; the
//! analyser discovers data dependencies against a versioned registry, wires
//! the task graph and releases ready tasks to a pluggable dispatcher.
//! Barriers and end-of-application requests surface completion back to
//! waiting applications.

pub mod access;
pub mod analyser;
pub mod data;
pub mod dispatch;
pub mod errors;
pub mod graph;
pub mod types;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::access::{AccessProcessor, Request};
use crate::analyser::{Analyser, AnalyserCore, RuntimeOptions};
use crate::dispatch::TaskDispatcher;
use crate::errors::Result;

/// Handles to a started runtime: the front door plus the analyser task.
pub struct RuntimeHandle {
    pub access: AccessProcessor,
    pub analyser: JoinHandle<Result<()>>,
}

/// Wire up and start the runtime inside the current tokio context.
///
/// The dispatcher factory receives a clone of the request sender so
/// dispatcher implementations can report completions back into the queue.
pub fn start_with<D, F>(options: RuntimeOptions, make_dispatcher: F) -> RuntimeHandle
where
    D: TaskDispatcher + 'static,
    F: FnOnce(mpsc::Sender<Request>) -> D,
{
    let (tx, rx) = mpsc::channel(options.queue_capacity);
    let dispatcher = make_dispatcher(tx.clone());
    let access = AccessProcessor::new(tx);
    let core = AnalyserCore::new(options);
    let analyser = Analyser::new(core, rx, dispatcher);
    let handle = tokio::spawn(analyser.run());

    RuntimeHandle {
        access,
        analyser: handle,
    }
}
