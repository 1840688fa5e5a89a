//! Model lifecycle
//!
//! Methods are looked up by identifier in a [`ModelRegistry`]; every method
//! implements the small [`AnomalyModel`] capability set (fit, predict, anomaly
//! label, artifact). [`ModelManager`] trains a method on a frame and persists
//! it as `{models_dir}/{method}_{name}.pkl`, or restores a persisted artifact
//! and turns its predictions into an [`AnomalyBatch`].
//!
//! ## Methods
//!
//! - **isoforest** (clustering): isolation forest, anomalies are `-1`
//! - **sdbscan** (clustering): DBSCAN on standardised features, noise is `-1`
//! - **naivebayes** (classification): Gaussian naive Bayes over a target column

pub mod dbscan;
pub mod explain;
pub mod isoforest;
pub mod naive_bayes;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::TrainingConfig;
use crate::error::{EngineError, EngineResult};
use crate::frame::{Cell, MetricFrame, csv_io};
use crate::pipeline::OneHotEncoder;
use crate::{AnomalyBatch, AnomalyRecord};

pub use explain::{DeviationExplainer, Explainer};

/// Prediction column added to the training output table
pub const PREDICTION_COLUMN: &str = "ano";

const ARTIFACT_EXTENSIONS: [&str; 2] = ["pkl", "model"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[default]
    Clustering,
    Classification,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Clustering => write!(f, "clustering"),
            ModelFamily::Classification => write!(f, "classification"),
        }
    }
}

/// Dense numeric view of a frame, one row per index value
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub index: Vec<i64>,
}

impl FeatureMatrix {
    /// Numeric columns of `frame`. Text columns are ignored, missing cells are
    /// rejected.
    pub fn from_frame(frame: &MetricFrame) -> Result<Self, String> {
        let numeric: Vec<_> = frame.columns().iter().filter(|c| c.is_numeric()).collect();
        if numeric.is_empty() {
            return Err("frame has no numeric columns".to_string());
        }

        let mut rows = vec![Vec::with_capacity(numeric.len()); frame.len()];
        for column in &numeric {
            for (row, cell) in column.cells.iter().enumerate() {
                let Cell::Num(value) = cell else {
                    return Err(format!(
                        "missing value in column '{}' at row {row}",
                        column.name
                    ));
                };
                rows[row].push(*value);
            }
        }

        Ok(Self {
            names: numeric.iter().map(|c| c.name.clone()).collect(),
            rows,
            index: frame.index().to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    /// Reorder columns to `names`, as recorded when the model was trained.
    pub fn aligned(&self, names: &[String]) -> Result<Self, String> {
        let positions = names
            .iter()
            .map(|name| {
                self.names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| format!("feature '{name}' missing from frame"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            names: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| positions.iter().map(|p| row[*p]).collect())
                .collect(),
            index: self.index.clone(),
        })
    }

    /// Population mean and standard deviation per feature.
    pub fn moments(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.len().max(1) as f64;
        let means: Vec<f64> = (0..self.width())
            .map(|j| self.rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let stds = (0..self.width())
            .map(|j| {
                let variance =
                    self.rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                variance.sqrt()
            })
            .collect();
        (means, stds)
    }
}

/// Capabilities every detection method provides
pub trait AnomalyModel: Send + Sync {
    fn method(&self) -> &str;

    fn fit(&mut self, features: &FeatureMatrix, target: Option<&[i32]>) -> EngineResult<()>;

    fn predict(&self, features: &FeatureMatrix) -> EngineResult<Vec<i32>>;

    /// Label marking anomalies, when the method has a fixed convention.
    fn anomaly_label(&self) -> Option<i32> {
        None
    }

    /// Serializable state, restored by the method's restore function.
    fn to_artifact(&self) -> EngineResult<Value>;
}

/// Anomaly label of a freshly trained model.
///
/// A declared label wins. Otherwise training predictions drawn from `{0, 1}`
/// mark anomalies with `1` and everything else with `-1`. The result is stored
/// with the artifact so detection never infers it from a live window.
pub fn resolve_anomaly_label(declared: Option<i32>, predictions: &[i32]) -> i32 {
    if let Some(label) = declared {
        return label;
    }
    if predictions.iter().all(|p| *p == 0 || *p == 1) {
        1
    } else {
        -1
    }
}

/// Settings merged over a method's defaults. `null` means all defaults.
pub(crate) fn parse_settings<T: DeserializeOwned + Default>(
    method: &str,
    settings: &Value,
) -> EngineResult<T> {
    if settings.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(settings.clone())
        .map_err(|e| EngineError::Config(format!("invalid settings for {method}: {e}")))
}

pub type CreateFn = fn(&Value) -> EngineResult<Box<dyn AnomalyModel>>;
pub type RestoreFn = fn(&Value) -> EngineResult<Box<dyn AnomalyModel>>;

#[derive(Clone, Copy)]
pub struct MethodSpec {
    pub family: ModelFamily,
    pub create: CreateFn,
    pub restore: RestoreFn,
}

/// Method identifier to implementation
#[derive(Clone, Default)]
pub struct ModelRegistry {
    methods: HashMap<String, MethodSpec>,
}

impl ModelRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(isoforest::METHOD, isoforest::spec());
        registry.register(dbscan::METHOD, dbscan::spec());
        registry.register(naive_bayes::METHOD, naive_bayes::spec());
        registry
    }

    pub fn register(&mut self, method: impl Into<String>, spec: MethodSpec) {
        self.methods.insert(method.into(), spec);
    }

    /// The method if it is registered for `family`.
    pub fn lookup(&self, method: &str, family: ModelFamily) -> EngineResult<MethodSpec> {
        match self.methods.get(method) {
            Some(spec) if spec.family == family => Ok(*spec),
            _ => Err(EngineError::UnknownMethod {
                method: method.to_string(),
                family,
            }),
        }
    }

    pub fn methods(&self, family: ModelFamily) -> Vec<&str> {
        let mut methods: Vec<&str> = self
            .methods
            .iter()
            .filter(|(_, spec)| spec.family == family)
            .map(|(name, _)| name.as_str())
            .collect();
        methods.sort_unstable();
        methods
    }
}

/// Persisted trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub method: String,
    pub name: String,
    pub family: ModelFamily,
    pub features: Vec<String>,
    pub anomaly_label: i32,
    pub trained_at: String,
    pub model: Value,
}

pub struct ModelManager {
    models_dir: PathBuf,
    registry: ModelRegistry,
    explainer: Option<Arc<dyn Explainer>>,
}

impl ModelManager {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            registry: ModelRegistry::builtin(),
            explainer: None,
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn artifact_path(&self, method: &str, name: &str) -> PathBuf {
        self.models_dir.join(format!("{method}_{name}.pkl"))
    }

    pub fn encoder_path(&self, method: &str, name: &str) -> PathBuf {
        self.models_dir.join(format!("{method}_{name}.encoder"))
    }

    /// Store the one-hot encoder `(method, name)` was trained with. `None`
    /// removes an encoder left by an earlier training run.
    pub fn save_encoder(
        &self,
        method: &str,
        name: &str,
        encoder: Option<&OneHotEncoder>,
    ) -> EngineResult<()> {
        let path = self.encoder_path(method, name);
        match encoder {
            Some(encoder) => {
                write_atomically(&path, &serde_json::to_vec(encoder)?)?;
                debug!("saved encoder to {}", path.display());
            }
            None if path.is_file() => std::fs::remove_file(&path)?,
            None => {}
        }
        Ok(())
    }

    /// Encoder saved next to `(method, name)`, if training used one.
    pub fn load_encoder(&self, method: &str, name: &str) -> EngineResult<Option<OneHotEncoder>> {
        let path = self.encoder_path(method, name);
        if !path.is_file() {
            return Ok(None);
        }
        let encoder = serde_json::from_slice(&std::fs::read(&path)?).map_err(|e| {
            EngineError::CorruptArtifact {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(encoder))
    }

    /// Existing artifact for `(method, name)`, `.pkl` before `.model`.
    pub fn find_artifact(&self, method: &str, name: &str) -> EngineResult<PathBuf> {
        ARTIFACT_EXTENSIONS
            .iter()
            .map(|ext| self.models_dir.join(format!("{method}_{name}.{ext}")))
            .find(|path| path.is_file())
            .ok_or_else(|| EngineError::ModelNotFound {
                method: method.to_string(),
                name: name.to_string(),
                dir: self.models_dir.clone(),
            })
    }

    /// Fit the configured method on `frame` and persist it under the export
    /// name, replacing any previous artifact.
    #[instrument(skip(self, frame, training), fields(method = %training.method, export = %training.export))]
    pub fn train(&self, frame: &MetricFrame, training: &TrainingConfig) -> EngineResult<ModelArtifact> {
        let method = training.method.as_str();
        let spec = self.registry.lookup(method, training.family)?;

        let mut features_frame = frame.clone();
        let target = match &training.target {
            Some(column) => Some(take_target(&mut features_frame, column, method)?),
            None => None,
        };
        let features = FeatureMatrix::from_frame(&features_frame).map_err(|reason| {
            EngineError::Fit {
                method: method.to_string(),
                reason,
            }
        })?;

        let mut model = (spec.create)(&training.settings)?;
        model.fit(&features, target.as_deref())?;
        let predictions = model.predict(&features)?;
        let label = resolve_anomaly_label(model.anomaly_label(), &predictions);
        let flagged = predictions.iter().filter(|p| **p == label).count();
        info!(
            "{method} trained on {} rows, {flagged} anomalies in training data",
            features.len()
        );

        let artifact = ModelArtifact {
            method: method.to_string(),
            name: training.export.clone(),
            family: training.family,
            features: features.names.clone(),
            anomaly_label: label,
            trained_at: Utc::now().to_rfc3339(),
            model: model.to_artifact()?,
        };
        let path = self.artifact_path(method, &training.export);
        write_atomically(&path, &serde_json::to_vec(&artifact)?)?;
        info!("saved model to {}", path.display());

        let mut annotated = features_frame;
        annotated.push_numeric(
            PREDICTION_COLUMN,
            predictions.iter().map(|p| Some(f64::from(*p))),
        )?;
        csv_io::write_csv(
            &annotated,
            &self.models_dir.join(format!("{method}_{}.csv", training.export)),
        )?;

        Ok(artifact)
    }

    /// Restore `(method, name)` and flag the anomalous rows of `frame`.
    #[instrument(skip(self, frame), fields(rows = frame.len()))]
    pub fn detect(
        &self,
        family: ModelFamily,
        method: &str,
        name: &str,
        frame: &MetricFrame,
        interval: &str,
    ) -> EngineResult<AnomalyBatch> {
        let spec = self.registry.lookup(method, family)?;
        let path = self.find_artifact(method, name)?;
        let (artifact, model) = restore(&path, method, spec)?;

        let batch = AnomalyBatch::new(method, interval).with_model(name);
        if frame.is_empty() {
            debug!("empty frame, nothing to detect");
            return Ok(batch);
        }

        let features = FeatureMatrix::from_frame(frame)
            .and_then(|m| m.aligned(&artifact.features))
            .map_err(|reason| EngineError::Predict {
                method: method.to_string(),
                reason,
            })?;
        let predictions = model.predict(&features)?;
        let label = artifact.anomaly_label;
        let flagged: Vec<usize> = predictions
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == label)
            .map(|(row, _)| row)
            .collect();

        let mut records: Vec<AnomalyRecord> = flagged
            .iter()
            .map(|row| AnomalyRecord::at_millis(features.index[*row]))
            .collect();
        let mut batch = batch;

        if let (Some(explainer), false) = (&self.explainer, flagged.is_empty()) {
            match explainer.explain(&features, &flagged) {
                Ok(explanation) => {
                    for (record, analysis) in records.iter_mut().zip(explanation.rows) {
                        record.analysis = Some(analysis);
                    }
                    batch.complete_analysis = Some(explanation.overall);
                }
                Err(e) => warn!("feature attribution failed: {e}"),
            }
        }

        debug!("{method}/{name}: {} of {} rows anomalous", records.len(), features.len());
        Ok(batch.with_anomalies(records))
    }
}

fn take_target(frame: &mut MetricFrame, column: &str, method: &str) -> EngineResult<Vec<i32>> {
    let target = frame
        .remove_column(column)
        .ok_or_else(|| EngineError::Config(format!("target column '{column}' not found")))?;
    target
        .cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.as_f64()
                .map(|v| v.round() as i32)
                .ok_or_else(|| EngineError::Fit {
                    method: method.to_string(),
                    reason: format!("target '{column}' has no numeric label at row {row}"),
                })
        })
        .collect()
}

fn restore(
    path: &Path,
    method: &str,
    spec: MethodSpec,
) -> EngineResult<(ModelArtifact, Box<dyn AnomalyModel>)> {
    let corrupt = |reason: String| EngineError::CorruptArtifact {
        path: path.to_path_buf(),
        reason,
    };

    let raw = std::fs::read(path)?;
    let artifact: ModelArtifact =
        serde_json::from_slice(&raw).map_err(|e| corrupt(e.to_string()))?;
    if artifact.method != method {
        return Err(corrupt(format!(
            "artifact was trained with {}, not {method}",
            artifact.method
        )));
    }
    let model = (spec.restore)(&artifact.model).map_err(|e| corrupt(e.to_string()))?;
    Ok((artifact, model))
}

fn write_atomically(path: &Path, contents: &[u8]) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TIME_INDEX;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    /// Model that predicts a fixed label sequence, cycling over the rows
    struct FixedModel {
        labels: Vec<i32>,
    }

    impl AnomalyModel for FixedModel {
        fn method(&self) -> &str {
            "fixed"
        }

        fn fit(&mut self, _features: &FeatureMatrix, _target: Option<&[i32]>) -> EngineResult<()> {
            Ok(())
        }

        fn predict(&self, features: &FeatureMatrix) -> EngineResult<Vec<i32>> {
            Ok((0..features.len())
                .map(|row| self.labels[row % self.labels.len()])
                .collect())
        }

        fn to_artifact(&self) -> EngineResult<Value> {
            Ok(json!({ "labels": self.labels }))
        }
    }

    fn fixed_spec() -> MethodSpec {
        fn build(value: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
            let labels = serde_json::from_value(value["labels"].clone())?;
            Ok(Box::new(FixedModel { labels }))
        }
        MethodSpec {
            family: ModelFamily::Clustering,
            create: build,
            restore: build,
        }
    }

    fn frame(rows: usize) -> MetricFrame {
        let mut frame = MetricFrame::with_index(
            TIME_INDEX,
            (0..rows as i64).map(|i| 1_700_000_000_000 + i * 10_000).collect(),
        );
        frame
            .push_numeric("cpu", (0..rows).map(|i| Some(i as f64)))
            .unwrap();
        frame
    }

    fn training(method: &str, settings: Value) -> TrainingConfig {
        TrainingConfig {
            family: ModelFamily::Clustering,
            method: method.into(),
            export: "modelA".into(),
            settings,
            target: None,
        }
    }

    fn manager_with_fixed(dir: &Path) -> ModelManager {
        let mut registry = ModelRegistry::builtin();
        registry.register("fixed", fixed_spec());
        ModelManager::new(dir).with_registry(registry)
    }

    #[test]
    fn test_label_resolution() {
        assert_eq!(resolve_anomaly_label(None, &[0, 1, 1, 0]), 1);
        assert_eq!(resolve_anomaly_label(None, &[-1, 1, 1]), -1);
        assert_eq!(resolve_anomaly_label(Some(-1), &[0, 1]), -1);
    }

    #[test]
    fn test_detect_with_zero_one_model_flags_ones() {
        let dir = tempdir().unwrap();
        let manager = manager_with_fixed(dir.path());
        manager
            .train(&frame(4), &training("fixed", json!({ "labels": [0, 1] })))
            .unwrap();

        let batch = manager
            .detect(ModelFamily::Clustering, "fixed", "modelA", &frame(4), "10s")
            .unwrap();

        let utcs: Vec<i64> = batch.anomalies.iter().map(|a| a.utc).collect();
        assert_eq!(utcs, vec![1_700_000_010, 1_700_000_030]);
        assert_eq!(batch.model.as_deref(), Some("modelA"));
    }

    #[test]
    fn test_detect_with_minus_one_model_flags_minus_ones() {
        let dir = tempdir().unwrap();
        let manager = manager_with_fixed(dir.path());
        manager
            .train(&frame(3), &training("fixed", json!({ "labels": [1, -1, 1] })))
            .unwrap();

        let batch = manager
            .detect(ModelFamily::Clustering, "fixed", "modelA", &frame(3), "10s")
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.anomalies[0].utc, 1_700_000_010);
    }

    #[test]
    fn test_label_is_fixed_at_training() {
        let dir = tempdir().unwrap();
        let manager = manager_with_fixed(dir.path());
        let artifact = manager
            .train(&frame(2), &training("fixed", json!({ "labels": [1, -1] })))
            .unwrap();
        assert_eq!(artifact.anomaly_label, -1);

        // a window predicted all normal must not flip the label to 1
        let batch = manager
            .detect(ModelFamily::Clustering, "fixed", "modelA", &frame(1), "10s")
            .unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_encoder_is_saved_next_to_artifact() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        assert_eq!(manager.load_encoder("isoforest", "modelA").unwrap(), None);

        let encoder = OneHotEncoder {
            categories: vec![("host".into(), vec!["n1".into(), "n2".into()])],
        };
        manager.save_encoder("isoforest", "modelA", Some(&encoder)).unwrap();
        assert_eq!(manager.load_encoder("isoforest", "modelA").unwrap(), Some(encoder));

        manager.save_encoder("isoforest", "modelA", None).unwrap();
        assert!(!manager.encoder_path("isoforest", "modelA").exists());
    }

    #[test]
    fn test_unknown_method_for_family() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        let mut config = training("naivebayes", Value::Null);
        config.family = ModelFamily::Clustering;

        let result = manager.train(&frame(3), &config);
        assert_matches!(
            result,
            Err(EngineError::UnknownMethod { family: ModelFamily::Clustering, .. })
        );
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        let result = manager.detect(ModelFamily::Clustering, "isoforest", "modelA", &frame(3), "10s");
        assert_matches!(result, Err(EngineError::ModelNotFound { .. }));
    }

    #[test]
    fn test_model_extension_fallback() {
        let dir = tempdir().unwrap();
        let manager = manager_with_fixed(dir.path());
        manager
            .train(&frame(2), &training("fixed", json!({ "labels": [1] })))
            .unwrap();
        let pkl = manager.artifact_path("fixed", "modelA");
        std::fs::rename(&pkl, dir.path().join("fixed_modelA.model")).unwrap();

        assert_eq!(
            manager.find_artifact("fixed", "modelA").unwrap(),
            dir.path().join("fixed_modelA.model")
        );
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("isoforest_modelA.pkl"), b"not json").unwrap();
        let manager = ModelManager::new(dir.path());
        let result = manager.detect(ModelFamily::Clustering, "isoforest", "modelA", &frame(3), "10s");
        assert_matches!(result, Err(EngineError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_retrain_overwrites_artifact() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        let data = frame(40);

        manager
            .train(&data, &training("isoforest", json!({ "n_estimators": 5, "random_state": 1 })))
            .unwrap();
        let second = manager
            .train(&data, &training("isoforest", json!({ "n_estimators": 7, "random_state": 1 })))
            .unwrap();

        let artifacts: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "pkl" || ext == "tmp"))
            .collect();
        assert_eq!(artifacts.len(), 1);

        let stored: ModelArtifact =
            serde_json::from_slice(&std::fs::read(manager.artifact_path("isoforest", "modelA")).unwrap())
                .unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.model["settings"]["n_estimators"], 7);
    }

    #[test]
    fn test_training_writes_prediction_table() {
        let dir = tempdir().unwrap();
        let manager = manager_with_fixed(dir.path());
        manager
            .train(&frame(2), &training("fixed", json!({ "labels": [1, 0] })))
            .unwrap();

        let table = csv_io::read_csv(&dir.path().join("fixed_modelA.csv")).unwrap();
        assert_eq!(
            table.numeric(PREDICTION_COLUMN).unwrap(),
            vec![Some(1.0), Some(0.0)]
        );
    }

    #[test]
    fn test_missing_value_is_fit_error() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        let mut data = frame(2);
        data.push_numeric("mem", vec![Some(1.0), None]).unwrap();

        let result = manager.train(&data, &training("isoforest", Value::Null));
        assert_matches!(result, Err(EngineError::Fit { .. }));
    }

    #[test]
    fn test_explanation_is_attached() {
        let dir = tempdir().unwrap();
        let manager =
            manager_with_fixed(dir.path()).with_explainer(Arc::new(DeviationExplainer));
        manager
            .train(&frame(4), &training("fixed", json!({ "labels": [0, 0, 0, 1] })))
            .unwrap();

        let batch = manager
            .detect(ModelFamily::Clustering, "fixed", "modelA", &frame(4), "10s")
            .unwrap();
        assert!(batch.anomalies[0].analysis.as_ref().unwrap().contains_key("cpu"));
        assert!(batch.complete_analysis.is_some());
    }
}
