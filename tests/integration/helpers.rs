//! Helper functions for integration tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use event_detection_engine::backend::ReplayBackend;
use event_detection_engine::config::{
    Config, ConnectorConfig, DetectionConfig, ElasticsearchConfig, PathsConfig, TrainingConfig,
};
use event_detection_engine::engine::Engine;
use event_detection_engine::models::ModelFamily;
use event_detection_engine::report::{AnomalySink, Channel, MemorySink};
use event_detection_engine::AnomalyBatch;
use serde_json::{Value, json};

/// Bucket key of the outlier row in [`load_series`]
pub const OUTLIER_MS: i64 = 200_000;

/// Forty load buckets for one node with a single outlier at [`OUTLIER_MS`].
pub fn load_series() -> Value {
    let buckets: Vec<Value> = (0..40i64)
        .map(|i| {
            let key = i * 10_000;
            let (short, mid, long) = if key == OUTLIER_MS {
                (9.0, 8.0, 7.0)
            } else {
                (
                    1.0 + (i % 5) as f64 * 0.1,
                    1.0 + (i % 3) as f64 * 0.1,
                    1.0 + (i % 2) as f64 * 0.05,
                )
            };
            json!({
                "key": key,
                "doc_count": 6,
                "shortterm": { "value": short },
                "midterm": { "value": mid },
                "longterm": { "value": long }
            })
        })
        .collect();
    json!({ "aggregations": { "metrics": { "buckets": buckets } } })
}

/// Backend with node `n1` reporting [`load_series`].
pub fn system_backend() -> ReplayBackend {
    ReplayBackend::new(["n1"]).respond(r#"collectd_type:"load" AND host:"n1""#, load_series())
}

pub fn create_test_config(dir: &Path) -> Config {
    let mut config = Config {
        connector: ConnectorConfig {
            elasticsearch: Some(ElasticsearchConfig {
                endpoint: "http://localhost:9200".into(),
                index: "logstash-*".into(),
                control: None,
                host_field: "host".into(),
            }),
            ..Default::default()
        },
        mode: Default::default(),
        query: Default::default(),
        paths: PathsConfig {
            data_dir: dir.join("data"),
            models_dir: dir.join("models"),
            query_dir: dir.join("queries"),
        },
        filter: Default::default(),
        augmentation: None,
        training: None,
        detection: None,
        point: Default::default(),
    };
    config.query.from = Some(0);
    config.query.to = Some(400_000);
    config.mode.delay = "20ms".into();
    config
}

pub fn isoforest_training(export: &str) -> TrainingConfig {
    TrainingConfig {
        family: ModelFamily::Clustering,
        method: "isoforest".into(),
        export: export.into(),
        settings: json!({ "n_estimators": 50, "contamination": 0.05, "random_state": 7 }),
        target: None,
    }
}

pub fn isoforest_detection(load: &str) -> DetectionConfig {
    DetectionConfig {
        family: ModelFamily::Clustering,
        method: "isoforest".into(),
        load: load.into(),
        explain: false,
        scaler: None,
        messaging: false,
    }
}

pub fn create_test_engine(config: Config, backend: ReplayBackend, sink: Arc<MemorySink>) -> Engine {
    let sink: Arc<dyn AnomalySink> = sink;
    Engine::with_parts(Arc::new(config), Arc::new(backend), sink)
}

/// Poll `sink` until a batch with `method` arrives.
pub async fn wait_for_batch(sink: &MemorySink, method: &str) -> (Channel, AnomalyBatch) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(found) = sink.batches().into_iter().find(|(_, b)| b.method == method) {
            return found;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no {method} batch reported in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
