// tests/barriers_and_eoa.rs

//! Barrier and end-of-application synchronization, plus exception routing.

use depflow::access::Request;
use depflow::analyser::{AnalyserCore, RuntimeOptions};
use depflow::errors::DepflowError;
use depflow::types::{Direction, TaskException, TaskId, TaskOutcome};
use depflow_test_utils::builders::{file, TaskBuilder};
use depflow_test_utils::init_tracing;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

const APP: u64 = 1;

fn new_core() -> AnalyserCore {
    AnalyserCore::new(RuntimeOptions::default())
}

fn complete(core: &mut AnalyserCore, task_id: TaskId) {
    core.step(Request::TaskEnded {
        task_id,
        outcome: TaskOutcome::Success,
        exception: None,
    });
}

#[test]
fn barrier_waits_for_every_prior_task() {
    init_tracing();
    let mut core = new_core();
    let f = file("f.dat");

    core.step(TaskBuilder::method(1, APP, "produce").param(Direction::Out, f.clone()).request());
    core.step(TaskBuilder::method(2, APP, "read").param(Direction::In, f.clone()).request());

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: APP, reply });
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)), "two tasks still live");

    complete(&mut core, 1);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)), "one task still live");

    complete(&mut core, 2);
    let status = rx.try_recv().expect("barrier released").expect("barrier result");
    assert_eq!(status.total, 2);
    assert_eq!(status.finished, 2);
}

#[test]
fn barrier_on_an_idle_application_fires_immediately() {
    init_tracing();
    let mut core = new_core();

    core.step(TaskBuilder::method(1, APP, "only").request());
    complete(&mut core, 1);

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: APP, reply });
    let status = rx.try_recv().expect("nothing to wait for").expect("barrier result");
    assert_eq!(status.finished, 1);
}

#[test]
fn barrier_on_unknown_application_is_rejected() {
    init_tracing();
    let mut core = new_core();

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: 42, reply });
    let err = rx.try_recv().expect("replied synchronously").expect_err("no such app");
    assert!(matches!(err, DepflowError::UnknownApp(42)));
}

#[test]
fn barrier_ignores_tasks_submitted_after_it() {
    init_tracing();
    let mut core = new_core();
    let f = file("f.dat");

    core.step(TaskBuilder::method(1, APP, "first").param(Direction::Out, f.clone()).request());

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: APP, reply });

    // Submitted after the barrier; must not hold it up.
    core.step(TaskBuilder::method(2, APP, "second").param(Direction::InOut, f.clone()).request());

    complete(&mut core, 1);
    let status = rx.try_recv().expect("only the first task was tracked").expect("barrier result");
    assert_eq!(status.total, 1);
    assert_eq!(status.finished, 1);
}

#[test]
fn end_of_app_fires_once_all_tasks_are_terminal() {
    init_tracing();
    let mut core = new_core();

    core.step(TaskBuilder::method(1, APP, "only").request());

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::EndOfApp { app_id: APP, reply });
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)), "task still live");

    complete(&mut core, 1);
    let status = rx.try_recv().expect("application ended").expect("end-of-app result");
    assert_eq!(status.finished, 1);

    assert!(core.snapshot().is_empty(), "graph reclaimed with the application");
}

#[test]
fn tasks_after_end_of_app_are_dropped() {
    init_tracing();
    let mut core = new_core();

    core.step(TaskBuilder::method(1, APP, "pending").request());
    let (reply, _rx) = oneshot::channel();
    core.step(Request::EndOfApp { app_id: APP, reply });

    let step = core.step(TaskBuilder::method(2, APP, "late").request());
    assert!(step.dispatch.is_empty());
    assert_eq!(core.task_state(2), None, "never entered the graph");
}

#[test]
fn end_of_app_waits_for_open_barriers() {
    init_tracing();
    let mut core = new_core();

    core.step(TaskBuilder::method(1, APP, "only").request());

    let (barrier_reply, mut barrier_rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: APP, reply: barrier_reply });
    let (eoa_reply, mut eoa_rx) = oneshot::channel();
    core.step(Request::EndOfApp { app_id: APP, reply: eoa_reply });

    complete(&mut core, 1);
    assert!(barrier_rx.try_recv().is_ok(), "barrier released first");
    assert!(eoa_rx.try_recv().is_ok(), "then the application ends");
}

#[test]
fn exceptions_surface_on_the_next_barrier_only() {
    init_tracing();
    let mut core = new_core();

    core.step(TaskBuilder::method(1, APP, "raiser").request());
    core.step(Request::TaskEnded {
        task_id: 1,
        outcome: TaskOutcome::Success,
        exception: Some(TaskException::new("user abort")),
    });

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: APP, reply });
    let status = rx.try_recv().expect("released").expect("barrier result");
    assert_eq!(status.exceptions.len(), 1);
    assert_eq!(status.exceptions[0].message, "user abort");

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::Barrier { app_id: APP, reply });
    let status = rx.try_recv().expect("released").expect("barrier result");
    assert!(status.exceptions.is_empty(), "drained by the first barrier");
}

#[test]
fn end_of_app_drops_exceptions_silently() {
    init_tracing();
    let mut core = new_core();

    core.step(TaskBuilder::method(1, APP, "raiser").request());
    core.step(Request::TaskEnded {
        task_id: 1,
        outcome: TaskOutcome::Success,
        exception: Some(TaskException::new("user abort")),
    });

    let (reply, mut rx) = oneshot::channel();
    core.step(Request::EndOfApp { app_id: APP, reply });
    let status = rx.try_recv().expect("application ended").expect("end-of-app result");
    assert!(status.exceptions.is_empty());
}

#[test]
fn end_of_app_request_refuses_exceptions() {
    init_tracing();

    let (reply, _rx) = oneshot::channel();
    let mut request = Request::EndOfApp { app_id: APP, reply };
    request.set_exception(TaskException::new("ignored"));
    assert!(request.exception().is_none());

    let mut request = Request::TaskEnded {
        task_id: 1,
        outcome: TaskOutcome::Success,
        exception: None,
    };
    request.set_exception(TaskException::new("kept"));
    assert_eq!(request.exception().map(|exc| exc.message.as_str()), Some("kept"));
}
