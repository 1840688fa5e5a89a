//! Failure containment tests
//!
//! These tests verify the cycle policy of each duty:
//! - a missing or corrupt model is fatal and halts every other duty
//! - backend and report failures only skip a cycle

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use event_detection_engine::EngineError;
use event_detection_engine::backend::ReplayBackend;
use event_detection_engine::collectors::Acquisition;
use event_detection_engine::point::ThresholdEvaluator;
use event_detection_engine::report::{MemorySink, ReportingSink};
use event_detection_engine::tasks::{DutyKind, PointDuty, TaskState, settle};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_missing_model_halts_siblings() {
    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.mode.point = true;
    config.mode.detect = true;
    config.detection = Some(isoforest_detection("modelA"));

    let engine = create_test_engine(config, system_backend(), Arc::new(MemorySink::new()));
    let running = engine.build_supervisor(vec!["n1".into()]).unwrap().start();
    let handles = running.handles().to_vec();

    let result = running.wait().await;

    assert_matches!(
        result,
        Err(EngineError::ModelNotFound { method: ref m, name: ref n, .. })
            if m == "isoforest" && n == "modelA"
    );
    assert_eq!(handles[0].kind(), DutyKind::Point);
    assert_eq!(
        handles[0].state(),
        TaskState::Failed {
            reason: "halted".into()
        }
    );
    assert_matches!(handles[1].state(), TaskState::Failed { ref reason } if reason != "halted");
}

#[tokio::test]
async fn test_corrupt_artifact_is_fatal() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("models")).unwrap();
    std::fs::write(dir.path().join("models/isoforest_modelA.pkl"), b"not a model").unwrap();

    let mut config = create_test_config(dir.path());
    config.mode.detect = true;
    config.detection = Some(isoforest_detection("modelA"));

    let result = create_test_engine(config, system_backend(), Arc::new(MemorySink::new()))
        .run()
        .await;

    assert_matches!(result, Err(EngineError::CorruptArtifact { .. }));
}

#[tokio::test]
async fn test_training_failure_is_fatal() {
    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.mode.train = true;
    config.training = Some(isoforest_training("modelA"));

    // no data for any node: the domain comes back empty
    let result = create_test_engine(config, ReplayBackend::new(["n1"]), Arc::new(MemorySink::new()))
        .run()
        .await;

    assert_matches!(result, Err(EngineError::EmptyResult(_)));
    assert!(!dir.path().join("models/isoforest_modelA.pkl").exists());
}

#[tokio::test]
async fn test_backend_failure_skips_point_cycles() {
    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.mode.point = true;

    let backend = system_backend().fail(r#"host:"n1""#);
    let engine = create_test_engine(config, backend, Arc::new(MemorySink::new()));
    let running = engine.build_supervisor(vec!["n1".into()]).unwrap().start();
    let handle = running.handles()[0].clone();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state(), TaskState::Running);

    running.halt();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_report_failure_is_recovered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/anomalies/_doc"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    if let Some(es) = config.connector.elasticsearch.as_mut() {
        es.endpoint = server.uri();
    }
    let sink = ReportingSink::new(&config.connector).unwrap();

    let acquisition = Acquisition::new(&config, Arc::new(system_backend()), vec!["n1".into()]);
    let duty = PointDuty::new(
        Arc::new(acquisition),
        ThresholdEvaluator::from_config(&config.point).unwrap(),
        Arc::new(sink),
        "30s",
        Duration::from_millis(10),
    );

    let result = duty.cycle().await;

    assert_matches!(result, Err(EngineError::Report(_)));
    assert!(settle(DutyKind::Point, result.map(|_| ())).is_ok());
}
