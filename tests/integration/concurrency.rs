//! Concurrency tests for the supervisor
//!
//! Both executors must run the same duties with the same outcome, and a
//! finished Train duty must not disturb the looping duties.

use std::sync::Arc;

use event_detection_engine::config::ExecutorKind;
use event_detection_engine::report::MemorySink;
use event_detection_engine::tasks::{DutyKind, TaskState};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

async fn point_reports_with(executor: ExecutorKind) -> usize {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut config = create_test_config(dir.path());
    config.mode.point = true;
    config.mode.executor = executor;

    let engine = create_test_engine(config, system_backend(), sink.clone());
    let running = engine.build_supervisor(vec!["n1".into()]).unwrap().start();
    let (_, batch) = wait_for_batch(&sink, "point").await;

    running.halt();
    running.wait().await.unwrap();
    batch.len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_executors_are_interchangeable() {
    let on_tasks = point_reports_with(ExecutorKind::Task).await;
    let on_threads = point_reports_with(ExecutorKind::Thread).await;

    assert_eq!(on_tasks, 3);
    assert_eq!(on_tasks, on_threads);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_train_completes_while_point_keeps_running() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut config = create_test_config(dir.path());
    config.mode.point = true;
    config.mode.train = true;
    config.training = Some(isoforest_training("modelA"));

    let engine = create_test_engine(config, system_backend(), sink.clone());
    let running = engine.build_supervisor(vec!["n1".into()]).unwrap().start();
    let mut train = running
        .handles()
        .iter()
        .find(|h| h.kind() == DutyKind::Train)
        .cloned()
        .unwrap();
    let point = running
        .handles()
        .iter()
        .find(|h| h.kind() == DutyKind::Point)
        .cloned()
        .unwrap();

    assert_eq!(train.finished().await, TaskState::Completed);
    assert_eq!(point.state(), TaskState::Running);
    wait_for_batch(&sink, "point").await;

    running.halt();
    running.wait().await.unwrap();
    assert!(dir.path().join("models/isoforest_modelA.pkl").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fail_fast_on_thread_executor() {
    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.mode.point = true;
    config.mode.detect = true;
    config.mode.executor = ExecutorKind::Thread;
    config.detection = Some(isoforest_detection("missing"));

    let engine = create_test_engine(config, system_backend(), Arc::new(MemorySink::new()));
    let running = engine.build_supervisor(vec!["n1".into()]).unwrap().start();
    let handles = running.handles().to_vec();

    assert!(running.wait().await.is_err());
    assert!(handles.iter().all(|h| h.state().is_terminal()));
}
