// src/analyser/handlers.rs

//! Per-request processing logic for the analyser core.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::access::request::{MainAccess, Reply, Request};
use crate::analyser::core::{AnalyserCore, AnalyserFault, AppState, BarrierWaiter, MainWaiter};
use crate::dispatch::ReadyTask;
use crate::errors::{DepflowError, Result};
use crate::graph::{DataAccess, TaskNode, TaskState};
use crate::types::{AppId, DataRef, Direction, SyncStatus, TaskException, TaskId, TaskOutcome};

/// Result of processing one request.
pub struct CoreStep {
    /// Tasks that became ready, ordered prioritary-first then by id.
    pub dispatch: Vec<ReadyTask>,
    /// Whether the analyser loop should keep consuming requests.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn running(dispatch: Vec<ReadyTask>) -> Self {
        Self {
            dispatch,
            keep_running: true,
        }
    }
}

/// Analyse a newly submitted task: wire the enforcing edge, then one edge
/// set per data parameter, then dispatch if nothing blocks it.
pub(crate) fn handle_new_task(
    core: &mut AnalyserCore,
    task: TaskNode,
) -> std::result::Result<CoreStep, AnalyserFault> {
    let task_id = task.id;
    let app_id = task.app_id;

    let app = core.apps.entry(app_id).or_insert_with(AppState::default);
    if app.no_more_tasks {
        warn!(task_id, app_id, "task submitted after end of application; dropping");
        return Ok(CoreStep::running(Vec::new()));
    }
    app.live.insert(task_id);
    app.tasks.push(task_id);

    if !core.graph.insert(task) {
        return Err(AnalyserFault {
            message: format!("duplicate task id {task_id}"),
        });
    }
    debug!(task_id, app_id, "task entered analysis");

    let mut doomed = false;

    // The scheduling hint goes in before any data edge.
    if let Some(enforcing) = core.graph.get(task_id).and_then(|node| node.enforcing_task) {
        match core.graph.state_of(enforcing) {
            Some(TaskState::Failed) => doomed = true,
            Some(TaskState::Finished) => {}
            Some(_) => core.graph.add_dependency(enforcing, task_id),
            None => warn!(task_id, enforcing, "enforcing task unknown; ignoring hint"),
        }
    }

    let parameters = core
        .graph
        .get(task_id)
        .map(|node| node.description.parameters.clone())
        .unwrap_or_default();

    for parameter in &parameters {
        let Some(reference) = parameter.data_ref() else {
            continue;
        };
        let info = core.registry.access(reference, parameter.direction, task_id);

        for producer in &info.depends_on {
            if *producer == task_id {
                continue;
            }
            match core.graph.state_of(*producer) {
                Some(TaskState::Failed) => doomed = true,
                Some(TaskState::Finished) => {}
                Some(_) => core.graph.add_dependency(*producer, task_id),
                None => {}
            }
        }

        // Plain writes commit their version now; grouped writes commit when
        // the group closes.
        if parameter.direction.writes() && !parameter.direction.is_grouped() {
            core.registry.new_version(info.data_id, Some(task_id));
        }

        if let Some(node) = core.graph.get_mut(task_id) {
            node.accesses.push(DataAccess {
                data_id: info.data_id,
                version: info.version,
                direction: parameter.direction,
            });
        }
    }

    if doomed {
        debug!(task_id, "a predecessor already failed; cascading");
        let failed = fail_cascade(core, task_id);
        let stop = settle_terminal(core, failed);
        return Ok(CoreStep {
            dispatch: Vec::new(),
            keep_running: !stop,
        });
    }

    let mut dispatch = Vec::new();
    if let Some(node) = core.graph.get_mut(task_id) {
        if node.predecessors.is_empty() {
            node.state = TaskState::ToExecute;
            dispatch.push(ReadyTask::from_node(node));
            debug!(task_id, "no pending dependencies; ready for dispatch");
        }
    }
    Ok(CoreStep::running(dispatch))
}

/// Process one execution completion.
///
/// Replicated tasks stay live until every launched execution reports back;
/// one failed copy fails the task. A finished task releases its dependents
/// and a failed one cascades through them.
pub(crate) fn handle_task_ended(
    core: &mut AnalyserCore,
    task_id: TaskId,
    outcome: TaskOutcome,
    exception: Option<TaskException>,
) -> std::result::Result<CoreStep, AnalyserFault> {
    let Some(node) = core.graph.get_mut(task_id) else {
        warn!(task_id, "completion for unknown task; ignoring");
        return Ok(CoreStep::running(Vec::new()));
    };
    if node.state.is_terminal() {
        warn!(task_id, state = ?node.state, "completion for already terminal task; ignoring");
        return Ok(CoreStep::running(Vec::new()));
    }
    if node.state == TaskState::ToAnalyse {
        return Err(AnalyserFault {
            message: format!("task {task_id} ended before it was dispatched"),
        });
    }

    if node.execution_count == 0 {
        warn!(task_id, "no execution plan recorded; assuming a single execution");
        node.execution_count = 1;
    }
    node.execution_count -= 1;

    if let TaskOutcome::Failure(reason) = &outcome {
        warn!(task_id, reason = %reason, "execution reported failure");
        node.failed_execution = true;
    }
    if let Some(exc) = exception {
        node.exception = Some(exc);
    }

    if node.execution_count > 0 {
        debug!(
            task_id,
            remaining = node.execution_count,
            "execution finished; replicas still running"
        );
        return Ok(CoreStep::running(Vec::new()));
    }

    let failed_run = node.failed_execution;
    let mut dispatch = Vec::new();
    let stop;

    if failed_run {
        let failed = fail_cascade(core, task_id);
        stop = settle_terminal(core, failed);
    } else {
        if let Some(node) = core.graph.get_mut(task_id) {
            node.state = TaskState::Finished;
        }
        info!(task_id, "task finished");

        let freed = core.graph.release_dependents(task_id);
        for successor in freed {
            if let Some(node) = core.graph.get_mut(successor) {
                if node.state == TaskState::ToAnalyse {
                    node.state = TaskState::ToExecute;
                    dispatch.push(ReadyTask::from_node(node));
                    debug!(task_id = successor, "dependencies satisfied; ready for dispatch");
                }
            }
        }
        sort_ready(&mut dispatch);
        stop = settle_terminal(core, vec![task_id]);
    }

    Ok(CoreStep {
        dispatch,
        keep_running: !stop,
    })
}

/// Register a main-thread data access, waiting on live producers if needed.
pub(crate) fn handle_main_access(
    core: &mut AnalyserCore,
    app_id: AppId,
    reference: DataRef,
    direction: Direction,
    reply: Reply<Result<MainAccess>>,
) -> CoreStep {
    if !core.apps.contains_key(&app_id) {
        let _ = reply.send(Err(DepflowError::UnknownApp(app_id)));
        return CoreStep::running(Vec::new());
    }

    let data_id = core.registry.resolve(&reference);
    // A reader from the main thread must observe the whole group's output.
    core.registry.close_group(data_id);

    let mut pending = HashSet::new();
    let mut failed = None;
    for producer in core.registry.producers_of(data_id) {
        match core.graph.state_of(*producer) {
            Some(TaskState::Failed) => failed = Some(*producer),
            Some(state) if !state.is_terminal() => {
                pending.insert(*producer);
            }
            _ => {}
        }
    }

    let reference = core
        .registry
        .reference_of(data_id)
        .cloned()
        .unwrap_or(reference);

    let waiter = MainWaiter {
        data_id,
        reference,
        direction,
        pending,
        failed,
        reply,
    };

    if waiter.failed.is_some() || waiter.pending.is_empty() {
        finalize_main_access(core, waiter);
    } else {
        debug!(
            data_id,
            pending = waiter.pending.len(),
            "main access waiting on producers"
        );
        core.access_waiters.push(waiter);
    }
    CoreStep::running(Vec::new())
}

/// Register a barrier over every task the application submitted so far.
pub(crate) fn handle_barrier(
    core: &mut AnalyserCore,
    app_id: AppId,
    reply: Reply<Result<SyncStatus>>,
) -> CoreStep {
    match core.apps.get_mut(&app_id) {
        None => {
            let _ = reply.send(Err(DepflowError::UnknownApp(app_id)));
        }
        Some(app) => {
            let waiter = BarrierWaiter {
                tracked: app.tasks.clone(),
                pending: app.live.clone(),
                reply,
            };
            debug!(app_id, pending = waiter.pending.len(), "barrier registered");
            app.barriers.push(waiter);
            fire_ready_barriers(core, app_id);
        }
    }
    CoreStep::running(Vec::new())
}

/// Mark the application as accepting no more tasks; completes once every
/// task is terminal and all barriers have been released.
pub(crate) fn handle_end_of_app(
    core: &mut AnalyserCore,
    app_id: AppId,
    reply: Reply<Result<SyncStatus>>,
) -> CoreStep {
    let mut keep_running = true;
    match core.apps.get_mut(&app_id) {
        None => {
            let _ = reply.send(Err(DepflowError::UnknownApp(app_id)));
        }
        Some(app) if app.no_more_tasks => {
            let _ = reply.send(Err(DepflowError::AppEnded(app_id)));
        }
        Some(app) => {
            app.no_more_tasks = true;
            app.eoa_reply = Some(reply);
            info!(app_id, live = app.live.len(), "end of application requested");
            if maybe_end_app(core, app_id) {
                keep_running = !(core.options.stop_when_apps_ended && core.apps.is_empty());
            }
        }
    }
    CoreStep {
        dispatch: Vec::new(),
        keep_running,
    }
}

/// Fail a pending reply when the analyser can no longer serve it.
pub(crate) fn reject(request: Request, reason: &str) {
    match request {
        Request::MainAccess { reply, .. } => {
            let _ = reply.send(Err(DepflowError::RuntimeAborted(reason.to_string())));
        }
        Request::Barrier { reply, .. } | Request::EndOfApp { reply, .. } => {
            let _ = reply.send(Err(DepflowError::RuntimeAborted(reason.to_string())));
        }
        Request::Snapshot { reply } => drop(reply),
        _ => {}
    }
}

/// Order a ready batch: prioritary tasks first, then lower id.
pub(crate) fn sort_ready(tasks: &mut [ReadyTask]) {
    tasks.sort_by_key(|task| (std::cmp::Reverse(task.prioritary()), task.task_id));
}

/// Mark a task and its transitive dependents failed.
///
/// Only non-terminal tasks are touched; dependents that never ran go
/// straight from TO_ANALYSE to FAILED. Edges stay in place so the
/// propagation path remains observable.
fn fail_cascade(core: &mut AnalyserCore, root: TaskId) -> Vec<TaskId> {
    let mut stack = vec![root];
    let mut failed = Vec::new();

    while let Some(id) = stack.pop() {
        let Some(node) = core.graph.get_mut(id) else {
            continue;
        };
        if node.state.is_terminal() {
            continue;
        }
        node.state = TaskState::Failed;
        failed.push(id);
        stack.extend(node.successors.iter().copied());
        if id != root {
            debug!(task_id = id, "blocked by failed predecessor; marking failed");
        }
    }

    if failed.len() > 1 {
        warn!(root, cascaded = failed.len() - 1, "failure cascaded to dependents");
    }
    failed
}

/// Shared bookkeeping for tasks that just became terminal: release reader
/// registrations, update application state, fire barriers, main-access
/// waiters and end-of-app. Returns `true` when the analyser should stop.
fn settle_terminal(core: &mut AnalyserCore, ids: Vec<TaskId>) -> bool {
    if ids.is_empty() {
        return false;
    }

    let mut touched_apps: HashSet<AppId> = HashSet::new();

    for id in &ids {
        let Some(node) = core.graph.get_mut(*id) else {
            continue;
        };
        let app_id = node.app_id;
        let state = node.state;
        let accesses = std::mem::take(&mut node.accesses);
        let exception = node.exception.take();

        for access in &accesses {
            if access.direction.registers_reader() {
                core.registry.release_reader(access.data_id, access.version, *id);
            }
        }

        if let Some(app) = core.apps.get_mut(&app_id) {
            app.live.remove(id);
            if let Some(exc) = exception {
                app.exceptions.push(exc);
            }
            for barrier in app.barriers.iter_mut() {
                barrier.pending.remove(id);
            }
        }
        debug!(task_id = id, app_id, state = ?state, "task settled");
        touched_apps.insert(app_id);
    }

    update_access_waiters(core, &ids);

    let mut any_app_ended = false;
    for app_id in touched_apps {
        fire_ready_barriers(core, app_id);
        if maybe_end_app(core, app_id) {
            any_app_ended = true;
        }
    }

    any_app_ended && core.options.stop_when_apps_ended && core.apps.is_empty()
}

/// Release every barrier of the application whose pending set drained.
fn fire_ready_barriers(core: &mut AnalyserCore, app_id: AppId) {
    let ready: Vec<BarrierWaiter>;
    let mut exceptions: Option<Vec<TaskException>>;
    {
        let Some(app) = core.apps.get_mut(&app_id) else {
            return;
        };
        if !app.barriers.iter().any(|barrier| barrier.pending.is_empty()) {
            return;
        }
        let mut remaining = Vec::new();
        let mut done = Vec::new();
        for barrier in app.barriers.drain(..) {
            if barrier.pending.is_empty() {
                done.push(barrier);
            } else {
                remaining.push(barrier);
            }
        }
        app.barriers = remaining;
        ready = done;
        exceptions = Some(std::mem::take(&mut app.exceptions));
    }

    for waiter in ready {
        let mut status = aggregate_status(core, &waiter.tracked);
        if let Some(exc) = exceptions.take() {
            status.exceptions = exc;
        }
        debug!(
            app_id,
            finished = status.finished,
            failed = status.failed,
            "barrier released"
        );
        let _ = waiter.reply.send(Ok(status));
    }
}

/// Destroy the application if it has ended: fire the end-of-app reply and
/// reclaim every one of its tasks from the graph and the registry.
fn maybe_end_app(core: &mut AnalyserCore, app_id: AppId) -> bool {
    let ready = match core.apps.get(&app_id) {
        Some(app) => {
            app.no_more_tasks
                && app.live.is_empty()
                && app.barriers.is_empty()
                && app.eoa_reply.is_some()
        }
        None => false,
    };
    if !ready {
        return false;
    }

    let tracked = core
        .apps
        .get(&app_id)
        .map(|app| app.tasks.clone())
        .unwrap_or_default();
    let status = aggregate_status(core, &tracked);

    let Some(mut app) = core.apps.remove(&app_id) else {
        return false;
    };
    if let Some(reply) = app.eoa_reply.take() {
        // Exceptions are dropped here: end-of-app does not carry them.
        let _ = reply.send(Ok(status));
    }

    let ids: HashSet<TaskId> = app.tasks.iter().copied().collect();
    for id in &ids {
        core.graph.remove(*id);
    }
    core.registry.forget_tasks(&ids);
    info!(app_id, tasks = ids.len(), "application ended; graph reclaimed");
    true
}

/// Count terminal states over a tracked task set.
fn aggregate_status(core: &AnalyserCore, tracked: &[TaskId]) -> SyncStatus {
    let mut status = SyncStatus {
        total: tracked.len(),
        ..SyncStatus::default()
    };
    for id in tracked {
        match core.graph.state_of(*id) {
            Some(TaskState::Finished) => status.finished += 1,
            Some(TaskState::Failed) => status.failed += 1,
            _ => {}
        }
    }
    status
}

/// Drop newly terminal tasks from main-access waiters and finalize those
/// with nothing left to wait for.
fn update_access_waiters(core: &mut AnalyserCore, ids: &[TaskId]) {
    if core.access_waiters.is_empty() {
        return;
    }

    for id in ids {
        let failed = matches!(core.graph.state_of(*id), Some(TaskState::Failed));
        for waiter in core.access_waiters.iter_mut() {
            if waiter.pending.remove(id) && failed {
                waiter.failed = Some(*id);
            }
        }
    }

    let mut remaining = Vec::new();
    let mut ready = Vec::new();
    for waiter in core.access_waiters.drain(..) {
        if waiter.pending.is_empty() || waiter.failed.is_some() {
            ready.push(waiter);
        } else {
            remaining.push(waiter);
        }
    }
    core.access_waiters = remaining;

    for waiter in ready {
        finalize_main_access(core, waiter);
    }
}

/// Deliver a main access: error out on a failed producer, commit an
/// externally written version for write directions, reply with the current
/// version.
fn finalize_main_access(core: &mut AnalyserCore, waiter: MainWaiter) {
    if let Some(producer) = waiter.failed {
        let _ = waiter.reply.send(Err(DepflowError::ProducerFailed(producer)));
        return;
    }

    if waiter.direction.writes() {
        core.registry.new_version(waiter.data_id, None);
    }
    let version = core.registry.version_of(waiter.data_id).unwrap_or(1);
    debug!(data_id = waiter.data_id, version, "main access granted");
    let _ = waiter.reply.send(Ok(MainAccess {
        data_id: waiter.data_id,
        reference: waiter.reference,
        version,
    }));
}
