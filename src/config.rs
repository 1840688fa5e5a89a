use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::trace;

use crate::collectors::Domain;
use crate::error::{EngineError, EngineResult};
use crate::models::ModelFamily;
use crate::point::ThresholdTable;
use crate::util::parse_duration;

/// Complete run configuration, read once and shared read-only by every duty.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub connector: ConnectorConfig,

    #[serde(default)]
    pub mode: ModeConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    /// Filter/transform stages applied to every acquired frame
    #[serde(default)]
    pub filter: PipelineConfig,

    pub augmentation: Option<AugmentationConfig>,

    pub training: Option<TrainingConfig>,

    pub detection: Option<DetectionConfig>,

    #[serde(default)]
    pub point: PointConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub elasticsearch: Option<ElasticsearchConfig>,

    /// Local CSV used instead of the backend for training
    pub local: Option<PathBuf>,

    pub kafka: Option<KafkaConfig>,

    pub grafana: Option<GrafanaConfig>,

    #[serde(default = "default_anomaly_index")]
    pub anomaly_index: String,

    /// Drop and recreate the anomaly index on startup
    #[serde(default)]
    pub reset_index: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            elasticsearch: None,
            local: None,
            kafka: None,
            grafana: None,
            anomaly_index: default_anomaly_index(),
            reset_index: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    pub endpoint: String,

    #[serde(default = "default_metrics_index")]
    pub index: String,

    /// Monitoring platform control endpoint reporting collection intervals
    pub control: Option<String>,

    #[serde(default = "default_host_field")]
    pub host_field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka REST proxy base url
    pub rest_endpoint: String,

    #[serde(default = "default_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrafanaConfig {
    pub url: String,
    pub token: Option<String>,

    /// Tag used to find (or create) the annotation dashboard
    #[serde(default = "default_grafana_tag")]
    pub tag: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Duties run as async tasks on the shared runtime
    #[default]
    Task,
    /// Each duty gets a dedicated blocking thread
    Thread,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub point: bool,

    #[serde(default)]
    pub train: bool,

    #[serde(default)]
    pub detect: bool,

    /// Keep intermediate frames in memory instead of CSV files
    #[serde(default = "default_true")]
    pub checkpoint: bool,

    #[serde(default)]
    pub executor: ExecutorKind,

    /// Pause between Point/Detect cycles
    #[serde(default = "default_delay")]
    pub delay: String,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            point: false,
            train: false,
            detect: false,
            checkpoint: true,
            executor: ExecutorKind::default(),
            delay: default_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_domains")]
    pub domains: Vec<Domain>,

    /// Nodes to query; empty means every registered node
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Historical window start (epoch ms) for training
    pub from: Option<i64>,

    /// Historical window end (epoch ms) for training
    pub to: Option<i64>,

    /// Live window length for detection
    #[serde(default = "default_window")]
    pub interval: String,

    /// Histogram bucket size
    #[serde(default = "default_qinterval")]
    pub qinterval: String,

    #[serde(default)]
    pub size: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            domains: default_domains(),
            nodes: Vec::new(),
            from: None,
            to: None,
            interval: default_window(),
            qinterval: default_qinterval(),
            size: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_query_dir")]
    pub query_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            query_dir: default_query_dir(),
        }
    }
}

/// Filter/transform settings. Every stage is skipped when its option is unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    /// Column allow-list
    pub columns: Option<Vec<String>>,

    pub rows: Option<RowFilter>,

    /// Column deny-list
    pub drop: Option<Vec<String>>,

    #[serde(default)]
    pub low_variance: bool,

    pub fill: Option<FillStrategy>,

    #[serde(default)]
    pub dropna: bool,

    /// Column promoted to the timestamp index
    pub index: Option<String>,

    pub wildcard: Option<WildcardFilter>,

    /// Columns to one-hot encode
    pub categorical: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowFilter {
    #[serde(default = "default_row_column")]
    pub column: String,

    /// `0` leaves the bound open
    #[serde(default)]
    pub lower: f64,

    /// `0` leaves the bound open
    #[serde(default)]
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    Zero,
    Mean,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WildcardFilter {
    /// Required; optional only so a missing pattern can be reported clearly
    pub regex: Option<String>,

    #[serde(default = "default_true")]
    pub keep: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AugmentationConfig {
    pub scaler: Option<ScalerKind>,
    pub operations: Option<OperationsConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    Standard,
    MinMax,
}

impl ScalerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalerKind::Standard => "standard",
            ScalerKind::MinMax => "minmax",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationsConfig {
    pub ops: Vec<Operation>,

    /// Replace the source columns with the computed ones
    #[serde(default = "default_true")]
    pub remove_filtered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Mean,
    Sum,
    Max,
    Min,
    Std,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub family: ModelFamily,

    pub method: String,

    /// Artifact name the trained model is exported under
    pub export: String,

    /// Method specific settings, merged over the method defaults
    #[serde(default)]
    pub settings: serde_json::Value,

    /// Label column for classification methods
    pub target: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub family: ModelFamily,

    pub method: String,

    /// Artifact name to load
    pub load: String,

    /// Attach feature attribution to detected anomalies
    #[serde(default)]
    pub explain: bool,

    /// Scaler saved by a previous training run
    pub scaler: Option<String>,

    /// Deliver batches through the messaging channel instead of the store
    #[serde(default)]
    pub messaging: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointConfig {
    pub load: Option<ThresholdTable>,
    pub network: Option<ThresholdTable>,
    pub memory: Option<ThresholdTable>,

    /// Rolling window evaluated each cycle
    #[serde(default = "default_point_window")]
    pub window: String,
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            load: None,
            network: None,
            memory: None,
            window: default_point_window(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_anomaly_index() -> String {
    "anomalies".to_string()
}

fn default_metrics_index() -> String {
    "logstash-*".to_string()
}

fn default_host_field() -> String {
    "host".to_string()
}

fn default_topic() -> String {
    "edetopic".to_string()
}

fn default_grafana_tag() -> String {
    "ede".to_string()
}

fn default_delay() -> String {
    "10s".to_string()
}

fn default_domains() -> Vec<Domain> {
    vec![Domain::System]
}

fn default_window() -> String {
    "10m".to_string()
}

fn default_qinterval() -> String {
    "10s".to_string()
}

fn default_point_window() -> String {
    "30s".to_string()
}

fn default_row_column() -> String {
    crate::frame::TIME_INDEX.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_query_dir() -> PathBuf {
    PathBuf::from("./queries")
}

impl Config {
    /// Check everything that can be checked before touching the network.
    pub fn validate(&self) -> EngineResult<()> {
        let connector = &self.connector;

        if connector.elasticsearch.is_none() && connector.local.is_none() {
            return Err(EngineError::Config(
                "no data source: configure connector.elasticsearch or connector.local".into(),
            ));
        }
        if (self.mode.point || self.mode.detect) && connector.elasticsearch.is_none() {
            return Err(EngineError::Config(
                "point and detect modes need connector.elasticsearch".into(),
            ));
        }
        if !(self.mode.point || self.mode.train || self.mode.detect) {
            return Err(EngineError::Config(
                "nothing to do: enable at least one of point, train, detect".into(),
            ));
        }
        if self.mode.train && self.training.is_none() {
            return Err(EngineError::Config("train mode needs a training section".into()));
        }
        if self.mode.detect && self.detection.is_none() {
            return Err(EngineError::Config("detect mode needs a detection section".into()));
        }
        if self.query.domains.is_empty() {
            return Err(EngineError::Config("query.domains is empty".into()));
        }
        if let (Some(from), Some(to)) = (self.query.from, self.query.to) {
            if from >= to {
                return Err(EngineError::Config(format!(
                    "query window is empty: from {from} >= to {to}"
                )));
            }
        }

        for duration in [
            &self.mode.delay,
            &self.query.interval,
            &self.query.qinterval,
            &self.point.window,
        ] {
            parse_duration(duration)?;
        }

        let mut endpoints = Vec::new();
        if let Some(es) = &connector.elasticsearch {
            endpoints.push(es.endpoint.as_str());
            endpoints.extend(es.control.as_deref());
        }
        if let Some(kafka) = &connector.kafka {
            endpoints.push(kafka.rest_endpoint.as_str());
        }
        if let Some(grafana) = &connector.grafana {
            endpoints.push(grafana.url.as_str());
        }
        for endpoint in endpoints {
            url::Url::parse(endpoint)
                .map_err(|e| EngineError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
        }

        Ok(())
    }
}

/// Load a JSON configuration, or TOML when the file ends in `.toml`.
pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;

    let config: Config = if Path::new(path).extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&file_content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?
    } else {
        serde_json::from_str(&file_content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?
    };

    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
