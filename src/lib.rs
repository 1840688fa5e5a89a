pub mod backend;
pub mod collectors;
pub mod config;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod frame;
pub mod models;
pub mod pipeline;
pub mod point;
pub mod query;
pub mod report;
pub mod tasks;
pub mod util;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use error::{EngineError, EngineResult};
pub use frame::MetricFrame;

/// Feature name to attribution score
pub type Attribution = BTreeMap<String, f64>;

/// One anomalous instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Epoch seconds
    pub utc: i64,

    pub hutc: String,

    /// Metric or column that triggered a point anomaly
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Attribution>,
}

impl AnomalyRecord {
    /// Record for a frame index value (epoch milliseconds).
    pub fn at_millis(millis: i64) -> Self {
        let utc = millis.div_euclid(1000);
        Self {
            utc,
            hutc: util::human_utc(utc),
            kind: None,
            analysis: None,
        }
    }

    pub fn with_kind(mut self, kind: impl ToString) -> Self {
        self.kind = Some(kind.to_string());
        self
    }
}

/// Anomalies found in one detection cycle, as delivered to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyBatch {
    pub anomalies: Vec<AnomalyRecord>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub interval: String,

    /// Set by the sink right before dispatch
    #[serde(
        rename = "reporttimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub report_timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_analysis: Option<Attribution>,
}

impl AnomalyBatch {
    pub fn new(method: impl ToString, interval: impl ToString) -> Self {
        Self {
            anomalies: Vec::new(),
            method: method.to_string(),
            model: None,
            interval: interval.to_string(),
            report_timestamp: None,
            complete_analysis: None,
        }
    }

    pub fn with_model(mut self, model: impl ToString) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_anomalies(mut self, anomalies: Vec<AnomalyRecord>) -> Self {
        self.anomalies = anomalies;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }
}
