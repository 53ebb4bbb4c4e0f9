use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use depflow::access::Request;
use depflow::dispatch::{planned_executions, ExecutionPlan, ReadyTask, TaskDispatcher};
use depflow::errors::{DepflowError, Result};
use depflow::graph::ExecutionHandle;
use depflow::types::{TaskId, TaskOutcome};

fn make_plan(next_handle: &mut u64, task: &ReadyTask) -> ExecutionPlan {
    let executions = planned_executions(&task.description);
    let handles = (0..executions)
        .map(|_| {
            let handle = ExecutionHandle(*next_handle);
            *next_handle += 1;
            handle
        })
        .collect();
    ExecutionPlan {
        task_id: task.task_id,
        executions,
        handles,
    }
}

/// A fake dispatcher that:
/// - records which tasks were dispatched, in order
/// - immediately reports a successful completion for every planned execution.
pub struct FakeDispatcher {
    request_tx: mpsc::Sender<Request>,
    executed: Arc<Mutex<Vec<TaskId>>>,
    next_handle: u64,
}

impl FakeDispatcher {
    pub fn new(request_tx: mpsc::Sender<Request>, executed: Arc<Mutex<Vec<TaskId>>>) -> Self {
        Self {
            request_tx,
            executed,
            next_handle: 1,
        }
    }
}

impl TaskDispatcher for FakeDispatcher {
    fn dispatch(
        &mut self,
        tasks: Vec<ReadyTask>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionPlan>>> + Send + '_>> {
        let plans: Vec<ExecutionPlan> = tasks
            .iter()
            .map(|task| make_plan(&mut self.next_handle, task))
            .collect();
        let tx = self.request_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for plan in &plans {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(plan.task_id);
                }
                for _ in 0..plan.executions {
                    tx.send(Request::TaskEnded {
                        task_id: plan.task_id,
                        outcome: TaskOutcome::Success,
                        exception: None,
                    })
                    .await
                    .map_err(|_| DepflowError::QueueClosed)?;
                }
            }
            Ok(plans)
        })
    }
}

/// A dispatcher that records dispatched tasks and never completes them.
///
/// Tests drive completions themselves through the access processor, which
/// makes blocking behaviour (barriers, main accesses) observable.
pub struct ManualDispatcher {
    started: Arc<Mutex<Vec<ReadyTask>>>,
    next_handle: u64,
}

impl ManualDispatcher {
    pub fn new(started: Arc<Mutex<Vec<ReadyTask>>>) -> Self {
        Self {
            started,
            next_handle: 1,
        }
    }
}

impl TaskDispatcher for ManualDispatcher {
    fn dispatch(
        &mut self,
        tasks: Vec<ReadyTask>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionPlan>>> + Send + '_>> {
        let plans: Vec<ExecutionPlan> = tasks
            .iter()
            .map(|task| make_plan(&mut self.next_handle, task))
            .collect();
        let started = Arc::clone(&self.started);

        Box::pin(async move {
            {
                let mut guard = started.lock().unwrap();
                guard.extend(tasks);
            }
            Ok(plans)
        })
    }
}

/// Heap entry ordering dispatched tasks like a dispatcher's ready set:
/// prioritary tasks first, then lower ids.
pub struct PriorityEntry(pub ReadyTask);

impl PartialEq for PriorityEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.task_id == other.0.task_id
    }
}

impl Eq for PriorityEntry {}

impl PartialOrd for PriorityEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .prioritary()
            .cmp(&other.0.prioritary())
            .then(other.0.task_id.cmp(&self.0.task_id))
    }
}

/// A dispatcher that accumulates ready tasks in a priority-ordered set,
/// the way a real dispatcher picks what to start next.
pub struct QueueingDispatcher {
    ready: Arc<Mutex<BinaryHeap<PriorityEntry>>>,
    next_handle: u64,
}

impl QueueingDispatcher {
    pub fn new(ready: Arc<Mutex<BinaryHeap<PriorityEntry>>>) -> Self {
        Self {
            ready,
            next_handle: 1,
        }
    }
}

/// Drain a ready set in start order.
pub fn drain_ready(ready: &Arc<Mutex<BinaryHeap<PriorityEntry>>>) -> Vec<TaskId> {
    let mut guard = ready.lock().unwrap();
    let mut order = Vec::with_capacity(guard.len());
    while let Some(entry) = guard.pop() {
        order.push(entry.0.task_id);
    }
    order
}

impl TaskDispatcher for QueueingDispatcher {
    fn dispatch(
        &mut self,
        tasks: Vec<ReadyTask>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionPlan>>> + Send + '_>> {
        let plans: Vec<ExecutionPlan> = tasks
            .iter()
            .map(|task| make_plan(&mut self.next_handle, task))
            .collect();
        let ready = Arc::clone(&self.ready);

        Box::pin(async move {
            {
                let mut guard = ready.lock().unwrap();
                for task in tasks {
                    guard.push(PriorityEntry(task));
                }
            }
            Ok(plans)
        })
    }
}
