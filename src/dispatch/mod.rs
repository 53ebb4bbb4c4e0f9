// src/dispatch/mod.rs

//! Pluggable task dispatcher abstraction.
//!
//! The analyser hands ready tasks to a [`TaskDispatcher`] instead of a raw
//! channel sender, so tests can swap in fakes that never launch anything.
//!
//! - [`ChannelDispatcher`] is the production implementation: it forwards
//!   ready tasks over an mpsc channel into a dispatcher-owned ready queue
//!   and plans one execution per task (or one per node for replicated
//!   tasks).
//! - Test backends live in the `depflow-test-utils` crate.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::{DepflowError, Result};
use crate::graph::{ExecutionHandle, TaskDescription, TaskNode};
use crate::types::{AppId, TaskId};

/// A task whose predecessors are all satisfied, ready for execution.
#[derive(Debug, Clone)]
pub struct ReadyTask {
    pub task_id: TaskId,
    pub app_id: AppId,
    pub description: TaskDescription,
}

impl ReadyTask {
    pub(crate) fn from_node(node: &TaskNode) -> Self {
        Self {
            task_id: node.id,
            app_id: node.app_id,
            description: node.description.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.description.kind.name()
    }

    pub fn prioritary(&self) -> bool {
        self.description.prioritary
    }
}

/// How the dispatcher decided to execute one task.
///
/// The execution count is dispatcher-provided on purpose: only the
/// dispatcher knows the replication degree it actually launched. The
/// analyser frees the task once that many completions have arrived.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub task_id: TaskId,
    pub executions: u32,
    pub handles: Vec<ExecutionHandle>,
}

/// Trait abstracting where ready tasks go.
///
/// The dispatcher promises to eventually report `task_ended` once per
/// planned execution, and must not order tasks the analyser has not
/// ordered through edges.
pub trait TaskDispatcher: Send {
    fn dispatch(
        &mut self,
        tasks: Vec<ReadyTask>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionPlan>>> + Send + '_>>;
}

/// Production dispatcher backend: forwards ready tasks over a channel.
///
/// The consuming side owns the actual ready queue and worker hand-off;
/// this end only plans execution counts and allocates handles.
#[derive(Debug)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<ReadyTask>,
    next_handle: u64,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<ReadyTask>) -> Self {
        Self { tx, next_handle: 1 }
    }

    /// Convenience constructor returning the consuming end as well.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReadyTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    fn plan_for(&mut self, task: &ReadyTask) -> ExecutionPlan {
        let executions = planned_executions(&task.description);
        let handles = (0..executions)
            .map(|_| {
                let handle = ExecutionHandle(self.next_handle);
                self.next_handle += 1;
                handle
            })
            .collect();
        ExecutionPlan {
            task_id: task.task_id,
            executions,
            handles,
        }
    }
}

impl TaskDispatcher for ChannelDispatcher {
    fn dispatch(
        &mut self,
        tasks: Vec<ReadyTask>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionPlan>>> + Send + '_>> {
        let plans: Vec<ExecutionPlan> = tasks.iter().map(|task| self.plan_for(task)).collect();
        let tx = self.tx.clone();
        Box::pin(async move {
            for task in tasks {
                tx.send(task).await.map_err(|_| DepflowError::QueueClosed)?;
            }
            Ok(plans)
        })
    }
}

/// Executions to launch for a description: one per node when replicated.
pub fn planned_executions(description: &TaskDescription) -> u32 {
    if description.replicated {
        description.num_nodes.max(1)
    } else {
        1
    }
}
