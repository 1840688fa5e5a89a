//! End-to-end flows: train a model, then detect with it

use std::sync::Arc;

use event_detection_engine::config::{AugmentationConfig, ScalerKind};
use event_detection_engine::report::{Channel, MemorySink};
use event_detection_engine::tasks::TaskState;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_train_then_detect_reports_outlier() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());

    let mut config = create_test_config(dir.path());
    config.mode.train = true;
    config.training = Some(isoforest_training("modelA"));
    config.augmentation = Some(AugmentationConfig {
        scaler: Some(ScalerKind::MinMax),
        operations: None,
    });
    create_test_engine(config.clone(), system_backend(), sink.clone())
        .run()
        .await
        .unwrap();

    assert!(dir.path().join("models/isoforest_modelA.pkl").exists());
    assert!(dir.path().join("models/isoforest_modelA.csv").exists());
    assert!(dir.path().join("data/minmax.scaler").exists());
    assert!(sink.batches().is_empty());

    config.mode.train = false;
    config.mode.detect = true;
    config.detection = Some(isoforest_detection("modelA"));
    if let Some(detection) = config.detection.as_mut() {
        detection.scaler = Some("minmax".into());
        detection.explain = true;
    }
    let engine = create_test_engine(config, system_backend(), sink.clone());
    let nodes = engine.init().await.unwrap();
    let running = engine.build_supervisor(nodes).unwrap().start();

    let (channel, batch) = wait_for_batch(&sink, "isoforest").await;
    running.halt();
    running.wait().await.unwrap();

    assert_eq!(channel, Channel::Store);
    assert_eq!(batch.model.as_deref(), Some("modelA"));
    assert_eq!(batch.interval, "10s");
    assert!(batch.report_timestamp.is_some());
    assert!(batch.anomalies.iter().any(|a| a.utc == OUTLIER_MS / 1000));

    let analysis = batch.anomalies[0].analysis.as_ref().unwrap();
    assert!(analysis.contains_key("shortterm_n1"));
    assert!(batch.complete_analysis.is_some());
}

#[tokio::test]
async fn test_file_mode_writes_checkpoints() {
    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.mode.train = true;
    config.mode.checkpoint = false;
    config.training = Some(isoforest_training("modelB"));

    create_test_engine(config, system_backend(), Arc::new(MemorySink::new()))
        .run()
        .await
        .unwrap();

    let data = dir.path().join("data");
    for file in ["load_n1.csv", "System.csv", "System.schema.json"] {
        assert!(data.join(file).exists(), "missing checkpoint {file}");
    }
    assert!(!data.join("memory_n1.csv").exists());
    assert!(!data.join("pr_data_filtered.csv").exists());
}

#[tokio::test]
async fn test_checkpoint_mode_persists_only_filtered_frame() {
    let dir = tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.mode.train = true;
    config.training = Some(isoforest_training("modelC"));

    create_test_engine(config, system_backend(), Arc::new(MemorySink::new()))
        .run()
        .await
        .unwrap();

    let data = dir.path().join("data");
    assert!(data.join("pr_data_filtered.csv").exists());
    assert!(!data.join("System.csv").exists());
    assert!(!data.join("load_n1.csv").exists());
    assert!(dir.path().join("models/isoforest_modelC.pkl").exists());
}

#[tokio::test]
async fn test_point_duty_reports_default_threshold_breaches() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut config = create_test_config(dir.path());
    config.mode.point = true;

    let engine = create_test_engine(config, system_backend(), sink.clone());
    let running = engine.build_supervisor(vec!["n1".into()]).unwrap().start();
    let (channel, batch) = wait_for_batch(&sink, "point").await;
    let handle = running.handles()[0].clone();

    assert_eq!(handle.state(), TaskState::Running);
    running.halt();
    running.wait().await.unwrap();

    assert_eq!(channel, Channel::Store);
    assert_eq!(batch.interval, "30s");
    let mut kinds: Vec<_> = batch
        .anomalies
        .iter()
        .filter_map(|a| a.kind.clone())
        .collect();
    kinds.sort();
    assert_eq!(kinds, vec!["longterm_n1", "midterm_n1", "shortterm_n1"]);
}
