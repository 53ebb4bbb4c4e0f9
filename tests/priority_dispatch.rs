// tests/priority_dispatch.rs

//! Dispatch ordering: prioritary tasks jump the ready set, ties break by id.

use std::collections::BinaryHeap;
use std::error::Error;
use std::sync::{Arc, Mutex};

use depflow::analyser::RuntimeOptions;
use depflow::graph::TaskDescription;
use depflow::start_with;
use depflow_test_utils::dispatchers::{drain_ready, QueueingDispatcher};
use depflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const APP: u64 = 1;

#[tokio::test]
async fn prioritary_tasks_start_first() -> TestResult {
    init_tracing();

    let ready = Arc::new(Mutex::new(BinaryHeap::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let ready = Arc::clone(&ready);
        move |_tx| QueueingDispatcher::new(ready)
    });
    let ap = handle.access;

    let t1 = ap
        .submit_task(APP, TaskDescription::method("Main", "normal", Vec::new()))
        .await?;
    let mut urgent = TaskDescription::method("Main", "urgent", Vec::new());
    urgent.prioritary = true;
    let t2 = ap.submit_task(APP, urgent).await?;

    // A snapshot round-trips through the analyser, flushing the queue.
    let _ = ap.snapshot().await?;

    assert_eq!(drain_ready(&ready), vec![t2, t1]);
    Ok(())
}

#[tokio::test]
async fn equally_ready_tasks_start_in_id_order() -> TestResult {
    init_tracing();

    let ready = Arc::new(Mutex::new(BinaryHeap::new()));
    let handle = start_with(RuntimeOptions::default(), {
        let ready = Arc::clone(&ready);
        move |_tx| QueueingDispatcher::new(ready)
    });
    let ap = handle.access;

    let t1 = ap
        .submit_task(APP, TaskDescription::method("Main", "a", Vec::new()))
        .await?;
    let t2 = ap
        .submit_task(APP, TaskDescription::method("Main", "b", Vec::new()))
        .await?;
    let _ = ap.snapshot().await?;

    assert_eq!(drain_ready(&ready), vec![t1, t2]);
    Ok(())
}
