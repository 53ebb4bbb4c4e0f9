// tests/runtime_fake_dispatcher.rs

//! Full runtime loop driven through the access processor, with a fake
//! dispatcher that completes everything it receives.

use std::error::Error;
use std::sync::{Arc, Mutex};

use depflow::analyser::RuntimeOptions;
use depflow::errors::DepflowError;
use depflow::graph::TaskState;
use depflow::types::{Direction, TaskOutcome};
use depflow::{graph::TaskDescription, start_with};
use depflow_test_utils::builders::file;
use depflow_test_utils::dispatchers::{FakeDispatcher, ManualDispatcher};
use depflow_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const APP: u64 = 1;

fn task(name: &str, direction: Direction, path: &str) -> TaskDescription {
    TaskDescription::method(
        "Main",
        name,
        vec![depflow::graph::Parameter::data(direction, file(path))],
    )
}

#[tokio::test]
async fn chain_runs_to_completion_in_dependency_order() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let executed = Arc::clone(&executed);
        move |tx| FakeDispatcher::new(tx, executed)
    });
    let ap = handle.access;

    let t1 = ap.submit_task(APP, task("produce", Direction::Out, "f.dat")).await?;
    let t2 = ap.submit_task(APP, task("transform", Direction::InOut, "f.dat")).await?;
    let t3 = ap.submit_task(APP, task("consume", Direction::In, "f.dat")).await?;

    let status = with_timeout(ap.barrier(APP)).await?;
    assert_eq!(status.finished, 3);
    assert_eq!(status.failed, 0);

    assert_eq!(*executed.lock().unwrap(), vec![t1, t2, t3]);
    assert_eq!(ap.task_count(), 3);

    let snapshot = ap.snapshot().await?;
    assert!(snapshot.tasks.iter().all(|t| t.state == TaskState::Finished));
    Ok(())
}

#[tokio::test]
async fn end_of_app_reclaims_and_closes_the_application() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let executed = Arc::clone(&executed);
        move |tx| FakeDispatcher::new(tx, executed)
    });
    let ap = handle.access;

    ap.submit_task(APP, task("produce", Direction::Out, "f.dat")).await?;

    let status = with_timeout(ap.end_of_app(APP)).await?;
    assert_eq!(status.finished, 1);

    let err = ap
        .submit_task(APP, task("late", Direction::Out, "g.dat"))
        .await
        .expect_err("application is gone");
    assert!(matches!(err, DepflowError::AppEnded(_)));

    let snapshot = ap.snapshot().await?;
    assert!(snapshot.is_empty(), "graph reclaimed");

    let err = ap.end_of_app(APP).await.expect_err("cannot end twice");
    assert!(matches!(err, DepflowError::AppEnded(_)));
    Ok(())
}

#[tokio::test]
async fn enforced_task_waits_for_its_hint() -> TestResult {
    init_tracing();

    let started = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let started = Arc::clone(&started);
        move |_tx| ManualDispatcher::new(started)
    });
    let ap = handle.access;

    // No data flows between these two; only the hint orders them.
    let t1 = ap
        .submit_task(APP, TaskDescription::method("Main", "first", Vec::new()))
        .await?;
    let t2 = ap
        .submit_enforced_task(
            APP,
            TaskDescription::method("Main", "second", Vec::new()),
            t1,
        )
        .await?;

    // A snapshot round-trips through the analyser, flushing the queue.
    let snapshot = ap.snapshot().await?;
    assert_eq!(
        snapshot.task(t2).expect("submitted").predecessors,
        vec![t1],
        "forced edge in place"
    );
    {
        let guard = started.lock().unwrap();
        let ids: Vec<_> = guard.iter().map(|task| task.task_id).collect();
        assert_eq!(ids, vec![t1], "the enforced task must not start yet");
    }

    ap.task_ended(t1, TaskOutcome::Success, None).await?;
    ap.task_ended(t2, TaskOutcome::Success, None).await?;
    let status = with_timeout(ap.barrier(APP)).await?;
    assert_eq!(status.finished, 2);

    let ids: Vec<_> = started.lock().unwrap().iter().map(|task| task.task_id).collect();
    assert_eq!(ids, vec![t1, t2]);
    Ok(())
}

#[tokio::test]
async fn replicated_task_needs_every_copy_to_finish() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let executed = Arc::clone(&executed);
        move |tx| FakeDispatcher::new(tx, executed)
    });
    let ap = handle.access;

    let mut description = task("replicated", Direction::Out, "f.dat");
    description.replicated = true;
    description.num_nodes = 3;
    let t1 = ap.submit_task(APP, description).await?;

    let status = with_timeout(ap.barrier(APP)).await?;
    assert_eq!(status.finished, 1, "three completions collapse into one task");
    assert_eq!(*executed.lock().unwrap(), vec![t1], "dispatched exactly once");
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_the_queue() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let executed = Arc::clone(&executed);
        move |tx| FakeDispatcher::new(tx, executed)
    });
    let ap = handle.access;

    ap.shutdown().await?;
    with_timeout(handle.analyser).await??;

    let err = ap
        .submit_task(APP, task("late", Direction::Out, "f.dat"))
        .await
        .expect_err("queue is gone");
    assert!(matches!(err, DepflowError::QueueClosed));
    Ok(())
}

#[tokio::test]
async fn analyser_stops_when_the_last_app_ends() -> TestResult {
    init_tracing();

    let options = RuntimeOptions {
        stop_when_apps_ended: true,
        ..RuntimeOptions::default()
    };
    let executed = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(options, {
        let executed = Arc::clone(&executed);
        move |tx| FakeDispatcher::new(tx, executed)
    });
    let ap = handle.access;

    ap.submit_task(APP, task("only", Direction::Out, "f.dat")).await?;
    let status = with_timeout(ap.end_of_app(APP)).await?;
    assert_eq!(status.finished, 1);

    with_timeout(handle.analyser).await??;
    Ok(())
}

#[tokio::test]
async fn malformed_parameters_are_rejected_synchronously() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let executed = Arc::clone(&executed);
        move |tx| FakeDispatcher::new(tx, executed)
    });
    let ap = handle.access;

    let mut description = TaskDescription::method("Main", "bad", vec![
        depflow::graph::Parameter::literal("41"),
    ]);
    description.parameters[0].direction = Direction::Out;
    let err = ap.submit_task(APP, description).await.expect_err("literal OUT");
    assert!(matches!(err, DepflowError::MalformedParameter(_)));

    let err = ap
        .submit_task(APP, task("empty", Direction::Out, ""))
        .await
        .expect_err("empty path");
    assert!(matches!(err, DepflowError::MalformedParameter(_)));

    let err = ap.barrier(7).await.expect_err("app never submitted");
    assert!(matches!(err, DepflowError::UnknownApp(7)));
    Ok(())
}

#[tokio::test]
async fn failure_surfaces_in_the_barrier_aggregate() -> TestResult {
    init_tracing();

    // Dispatcher that fails the first task it sees and succeeds otherwise.
    use depflow::access::Request;
    use depflow::dispatch::{ExecutionPlan, ReadyTask, TaskDispatcher};
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::mpsc;

    struct FailFirst {
        tx: mpsc::Sender<Request>,
        failed_one: bool,
    }

    impl TaskDispatcher for FailFirst {
        fn dispatch(
            &mut self,
            tasks: Vec<ReadyTask>,
        ) -> Pin<Box<dyn Future<Output = depflow::errors::Result<Vec<ExecutionPlan>>> + Send + '_>>
        {
            let fail_id = if self.failed_one {
                None
            } else {
                self.failed_one = true;
                tasks.first().map(|task| task.task_id)
            };
            let plans: Vec<ExecutionPlan> = tasks
                .iter()
                .map(|task| ExecutionPlan {
                    task_id: task.task_id,
                    executions: 1,
                    handles: Vec::new(),
                })
                .collect();
            let tx = self.tx.clone();
            Box::pin(async move {
                for plan in &plans {
                    let outcome = if Some(plan.task_id) == fail_id {
                        TaskOutcome::Failure("worker lost".into())
                    } else {
                        TaskOutcome::Success
                    };
                    tx.send(Request::TaskEnded {
                        task_id: plan.task_id,
                        outcome,
                        exception: None,
                    })
                    .await
                    .map_err(|_| DepflowError::QueueClosed)?;
                }
                Ok(plans)
            })
        }
    }

    let handle = start_with(RuntimeOptions::default(), |tx| FailFirst {
        tx,
        failed_one: false,
    });
    let ap = handle.access;

    ap.submit_task(APP, task("produce", Direction::Out, "f.dat")).await?;
    ap.submit_task(APP, task("read", Direction::In, "f.dat")).await?;

    let status = with_timeout(ap.barrier(APP)).await?;
    assert_eq!(status.failed, 2, "producer failed, reader cascaded");
    assert_eq!(status.finished, 0);
    Ok(())
}
