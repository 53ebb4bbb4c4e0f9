// src/analyser/core.rs

//! Pure analyser state machine.
//!
//! `AnalyserCore` owns the task graph, the data registry and per-application
//! state, and consumes one [`Request`] at a time through [`step`]. It has no
//! channels and performs no IO beyond firing one-shot completion signals,
//! so it can be driven synchronously in tests without a runtime.
//!
//! [`step`]: AnalyserCore::step

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{error, info};

use crate::access::request::{MainAccess, Reply, Request};
use crate::analyser::handlers;
use crate::analyser::handlers::CoreStep;
use crate::analyser::RuntimeOptions;
use crate::data::DataRegistry;
use crate::dispatch::ExecutionPlan;
use crate::errors::{DepflowError, Result};
use crate::graph::{GraphSnapshot, TaskGraph, TaskState};
use crate::types::{AppId, DataId, DataRef, DataVersion, Direction, SyncStatus, TaskException, TaskId};

/// Per-application bookkeeping.
#[derive(Default)]
pub(crate) struct AppState {
    /// Tasks not yet terminal.
    pub(crate) live: HashSet<TaskId>,
    /// Every task submitted by this application, in submission order.
    pub(crate) tasks: Vec<TaskId>,
    pub(crate) no_more_tasks: bool,
    pub(crate) eoa_reply: Option<Reply<Result<SyncStatus>>>,
    pub(crate) barriers: Vec<BarrierWaiter>,
    /// Exceptions raised by finished tasks, drained into the next barrier.
    pub(crate) exceptions: Vec<TaskException>,
}

/// A registered barrier, released once its pending set drains.
pub(crate) struct BarrierWaiter {
    /// Tasks submitted before the barrier.
    pub(crate) tracked: Vec<TaskId>,
    /// Tracked tasks not yet terminal.
    pub(crate) pending: HashSet<TaskId>,
    pub(crate) reply: Reply<Result<SyncStatus>>,
}

/// A main-thread access waiting for producers to become terminal.
pub(crate) struct MainWaiter {
    pub(crate) data_id: DataId,
    pub(crate) reference: DataRef,
    pub(crate) direction: Direction,
    pub(crate) pending: HashSet<TaskId>,
    /// First awaited producer observed to fail, if any.
    pub(crate) failed: Option<TaskId>,
    pub(crate) reply: Reply<Result<MainAccess>>,
}

/// Invariant violation inside the analyser. Fatal.
pub(crate) struct AnalyserFault {
    pub(crate) message: String,
}

pub struct AnalyserCore {
    pub(crate) graph: TaskGraph,
    pub(crate) registry: DataRegistry,
    pub(crate) apps: HashMap<AppId, AppState>,
    pub(crate) access_waiters: Vec<MainWaiter>,
    pub(crate) options: RuntimeOptions,
    faulted: bool,
}

impl fmt::Debug for AnalyserCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserCore")
            .field("tasks", &self.graph.len())
            .field("data", &self.registry.len())
            .field("apps", &self.apps.len())
            .field("faulted", &self.faulted)
            .finish_non_exhaustive()
    }
}

impl AnalyserCore {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            graph: TaskGraph::new(),
            registry: DataRegistry::new(),
            apps: HashMap::new(),
            access_waiters: Vec::new(),
            options,
            faulted: false,
        }
    }

    /// Process one request to completion.
    pub fn step(&mut self, request: Request) -> CoreStep {
        if self.faulted {
            handlers::reject(request, "analyser faulted");
            return CoreStep {
                dispatch: Vec::new(),
                keep_running: false,
            };
        }

        let outcome = match request {
            Request::NewTask { task } => handlers::handle_new_task(self, task),
            Request::TaskEnded {
                task_id,
                outcome,
                exception,
            } => handlers::handle_task_ended(self, task_id, outcome, exception),
            Request::MainAccess {
                app_id,
                reference,
                direction,
                reply,
            } => Ok(handlers::handle_main_access(
                self, app_id, reference, direction, reply,
            )),
            Request::Barrier { app_id, reply } => {
                Ok(handlers::handle_barrier(self, app_id, reply))
            }
            Request::EndOfApp { app_id, reply } => {
                Ok(handlers::handle_end_of_app(self, app_id, reply))
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.graph.snapshot());
                Ok(CoreStep::running(Vec::new()))
            }
            Request::Shutdown => {
                info!("shutdown requested");
                self.abort_pending("shutdown requested");
                Ok(CoreStep {
                    dispatch: Vec::new(),
                    keep_running: false,
                })
            }
        };

        match outcome {
            Ok(step) => step,
            Err(fault) => self.fault(fault.message),
        }
    }

    /// Record dispatcher-provided execution plans for just-dispatched tasks.
    ///
    /// The shell calls this before consuming the next request, so a
    /// completion always finds the counter initialised.
    pub fn record_execution_plans(&mut self, plans: Vec<ExecutionPlan>) {
        for plan in plans {
            if let Some(node) = self.graph.get_mut(plan.task_id) {
                node.execution_count = plan.executions.max(1);
                node.executions.extend(plan.handles);
                tracing::debug!(
                    task_id = plan.task_id,
                    executions = node.execution_count,
                    "execution plan recorded"
                );
            }
        }
    }

    /// Fail every pending waiter. Idempotent.
    pub fn abort_pending(&mut self, reason: &str) {
        for waiter in self.access_waiters.drain(..) {
            let _ = waiter
                .reply
                .send(Err(DepflowError::RuntimeAborted(reason.to_string())));
        }
        for app in self.apps.values_mut() {
            for barrier in app.barriers.drain(..) {
                let _ = barrier
                    .reply
                    .send(Err(DepflowError::RuntimeAborted(reason.to_string())));
            }
            if let Some(reply) = app.eoa_reply.take() {
                let _ = reply.send(Err(DepflowError::RuntimeAborted(reason.to_string())));
            }
        }
    }

    fn fault(&mut self, message: String) -> CoreStep {
        error!(message = %message, "analyser invariant violated; aborting");
        self.faulted = true;
        self.abort_pending(&message);
        CoreStep {
            dispatch: Vec::new(),
            keep_running: false,
        }
    }

    // Read-only accessors, used by diagnostics and tests.

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.graph.state_of(id)
    }

    pub fn predecessors_of(&self, id: TaskId) -> Option<Vec<TaskId>> {
        self.graph.get(id).map(|node| node.predecessors.clone())
    }

    pub fn successors_of(&self, id: TaskId) -> Option<Vec<TaskId>> {
        self.graph.get(id).map(|node| node.successors.clone())
    }

    /// Current version of a datum, if it has been observed.
    pub fn data_version(&self, reference: &DataRef) -> Option<DataVersion> {
        let data_id = self.registry.lookup(reference)?;
        self.registry.version_of(data_id)
    }

    /// Producers of the current version of a datum.
    pub fn data_producers(&self, reference: &DataRef) -> Vec<TaskId> {
        match self.registry.lookup(reference) {
            Some(data_id) => self.registry.producers_of(data_id).to_vec(),
            None => Vec::new(),
        }
    }

    pub fn live_tasks(&self, app_id: AppId) -> usize {
        self.apps.get(&app_id).map(|app| app.live.len()).unwrap_or(0)
    }

    /// Whether no application has live tasks.
    pub fn is_idle(&self) -> bool {
        self.apps.values().all(|app| app.live.is_empty())
    }
}
