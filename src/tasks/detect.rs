use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, instrument, warn};

use super::{Duty, DutyKind, settle};
use crate::AnomalyBatch;
use crate::collectors::Acquisition;
use crate::config::{AugmentationConfig, DetectionConfig, PipelineConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::ModelManager;
use crate::pipeline::{self, RunMode, augment};
use crate::report::{AnomalySink, Channel};

/// Model inference over the live window
pub struct DetectDuty {
    acquisition: Arc<Acquisition>,
    manager: Arc<ModelManager>,
    sink: Arc<dyn AnomalySink>,
    filter: PipelineConfig,
    augmentation: Option<AugmentationConfig>,
    detection: DetectionConfig,
    delay: Duration,
    data_dir: PathBuf,
    checkpoint_dir: Option<PathBuf>,
}

impl DetectDuty {
    pub fn new(
        acquisition: Arc<Acquisition>,
        manager: Arc<ModelManager>,
        sink: Arc<dyn AnomalySink>,
        filter: PipelineConfig,
        detection: DetectionConfig,
        delay: Duration,
    ) -> Self {
        Self {
            acquisition,
            manager,
            sink,
            filter,
            augmentation: None,
            detection,
            delay,
            data_dir: PathBuf::from("."),
            checkpoint_dir: None,
        }
    }

    pub fn with_augmentation(mut self, augmentation: Option<AugmentationConfig>) -> Self {
        self.augmentation = augmentation;
        self
    }

    /// Directory holding scalers and, when `checkpoint` is set, filtered
    /// frames.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>, checkpoint: bool) -> Self {
        self.data_dir = data_dir.into();
        self.checkpoint_dir = checkpoint.then(|| self.data_dir.clone());
        self
    }

    /// Run the model over the current window without reporting.
    pub async fn detect(&self) -> EngineResult<AnomalyBatch> {
        let raw = self.acquisition.live_frame().await?;
        let encoder = self
            .manager
            .load_encoder(&self.detection.method, &self.detection.load)?;
        if encoder.is_none() && self.filter.categorical.is_some() {
            warn!("no encoder saved with {}, fitting one on the live window", self.detection.load);
        }
        let filtered = pipeline::apply(
            raw,
            &self.filter,
            None,
            RunMode::Detect,
            encoder.as_ref(),
            self.checkpoint_dir.as_deref(),
        )?;
        let frame = augment::for_detection(
            filtered.frame,
            self.augmentation.as_ref(),
            self.detection.scaler.as_deref(),
            &self.data_dir,
        )?;

        let manager = self.manager.clone();
        let detection = self.detection.clone();
        let interval = self.acquisition.qinterval().to_string();
        tokio::task::spawn_blocking(move || {
            manager.detect(
                detection.family,
                &detection.method,
                &detection.load,
                &frame,
                &interval,
            )
        })
        .await
        .map_err(|e| EngineError::Task(format!("detection task: {e}")))?
    }

    /// One detection; returns the number of reported anomalies.
    #[instrument(skip(self), fields(method = %self.detection.method, model = %self.detection.load))]
    pub async fn cycle(&self) -> EngineResult<usize> {
        let batch = self.detect().await?;
        if batch.is_empty() {
            debug!("no anomalies detected");
            return Ok(0);
        }

        let count = batch.len();
        self.sink
            .report(batch, Channel::select(self.detection.messaging))
            .await?;
        Ok(count)
    }

    async fn run_loop(self) -> EngineResult<()> {
        info!(
            "detecting with {}/{} every {:?}",
            self.detection.method, self.detection.load, self.delay
        );
        loop {
            settle(DutyKind::Detect, self.cycle().await.map(|_| ()))?;
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Duty for DetectDuty {
    fn kind(&self) -> DutyKind {
        DutyKind::Detect
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>> {
        (*self).run_loop().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReplayBackend;
    use crate::collectors::Domain;
    use crate::config::{Config, ConnectorConfig, ElasticsearchConfig, TrainingConfig};
    use crate::frame::{MetricFrame, TIME_INDEX};
    use crate::models::ModelFamily;
    use crate::pipeline::OneHotEncoder;
    use crate::report::MemorySink;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn detection() -> DetectionConfig {
        DetectionConfig {
            family: ModelFamily::Clustering,
            method: "isoforest".into(),
            load: "modelA".into(),
            explain: false,
            scaler: None,
            messaging: false,
        }
    }

    fn base_config() -> Config {
        Config {
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
            paths: Default::default(),
            filter: Default::default(),
            augmentation: None,
            training: None,
            detection: None,
            point: Default::default(),
        }
    }

    fn acquisition() -> Acquisition {
        let config = base_config();
        let backend = ReplayBackend::new(["n1"]).respond(
            r#"collectd_type:"load""#,
            serde_json::json!({ "aggregations": { "metrics": { "buckets": [
                { "key": 1_000, "doc_count": 1, "shortterm": { "value": 1.0 },
                  "midterm": { "value": 1.0 }, "longterm": { "value": 1.0 } }
            ] } } }),
        );
        Acquisition::new(&config, Arc::new(backend), vec!["n1".into()])
    }

    #[tokio::test]
    async fn test_live_window_reuses_training_encoder() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(dir.path());

        let mut training_frame = MetricFrame::with_index(TIME_INDEX, (0..20).collect());
        training_frame
            .push_numeric("ms", (0..20).map(|i| Some(5.0 + (i % 4) as f64)))
            .unwrap();
        training_frame
            .push_numeric("Component_api", (0..20).map(|i| Some((i % 2) as f64)))
            .unwrap();
        training_frame
            .push_numeric("Component_db", (0..20).map(|i| Some(((i + 1) % 2) as f64)))
            .unwrap();
        manager
            .train(
                &training_frame,
                &TrainingConfig {
                    family: ModelFamily::Clustering,
                    method: "isoforest".into(),
                    export: "modelA".into(),
                    settings: serde_json::json!({ "n_estimators": 10, "random_state": 3 }),
                    target: None,
                },
            )
            .unwrap();
        let encoder = OneHotEncoder {
            categories: vec![("Component".into(), vec!["api".into(), "db".into()])],
        };
        manager.save_encoder("isoforest", "modelA", Some(&encoder)).unwrap();

        let mut config = base_config();
        config.query.domains = vec![Domain::Cep];
        // only "api" events in the live window
        let backend = ReplayBackend::new(["n1"]).respond(
            "Component:*",
            serde_json::json!({ "hits": { "hits": [
                { "_source": { "@timestamp": 1_700_000_000, "ms": 6, "Component": "api",
                               "host": "n1", "ship": "s1", "method": "get" } },
                { "_source": { "@timestamp": 1_700_000_010, "ms": 7, "Component": "api",
                               "host": "n1", "ship": "s1", "method": "put" } }
            ] } }),
        );
        let duty = DetectDuty::new(
            Arc::new(Acquisition::new(&config, Arc::new(backend), vec!["n1".into()])),
            Arc::new(manager),
            Arc::new(MemorySink::new()),
            PipelineConfig {
                categorical: Some(vec!["Component".into()]),
                ..Default::default()
            },
            detection(),
            Duration::from_millis(10),
        );

        let batch = duty.detect().await.unwrap();
        assert_eq!(batch.model.as_deref(), Some("modelA"));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_fatal() {
        let dir = tempdir().unwrap();
        let duty = DetectDuty::new(
            Arc::new(acquisition()),
            Arc::new(ModelManager::new(dir.path())),
            Arc::new(MemorySink::new()),
            PipelineConfig::default(),
            detection(),
            Duration::from_millis(10),
        );

        let result = duty.cycle().await;
        assert_matches!(result, Err(EngineError::ModelNotFound { .. }));
        assert!(settle(DutyKind::Detect, result.map(|_| ())).is_err());
    }
}
