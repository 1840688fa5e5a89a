//! Monitoring backend connectors
//!
//! The engine only needs four things from a monitoring backend: run an
//! aggregation query, list the monitored nodes, report collection intervals
//! and load local data. Query bodies and responses are opaque JSON; building
//! and flattening them is the job of [`crate::query`] and
//! [`crate::formatter`].
//!
//! ## Backends
//!
//! - **Elasticsearch**: HTTP connector used in production
//! - **Replay**: canned responses, for offline runs and testing

pub mod elasticsearch;
pub mod replay;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::frame::{MetricFrame, csv_io};

pub use elasticsearch::ElasticsearchBackend;
pub use replay::ReplayBackend;

/// Trait for metric sources
///
/// Implementations must be `Send + Sync`, every duty holds a shared handle.
#[async_trait]
pub trait MonitoringBackend: Send + Sync {
    /// Run an aggregation (or search) query and return the raw response.
    async fn agg_query(&self, body: &Value) -> EngineResult<Value>;

    /// Nodes currently reporting metrics.
    async fn node_list(&self) -> EngineResult<Vec<String>>;

    /// Collection interval in seconds per domain (`System`, `YARN`, ...).
    async fn interval(&self) -> EngineResult<HashMap<String, u64>>;

    /// Short human readable status, logged at startup.
    async fn health(&self) -> EngineResult<String> {
        Ok("unknown".to_string())
    }

    /// Load a local CSV table with a positional index.
    async fn local_data(&self, path: &Path) -> EngineResult<MetricFrame> {
        if !path.exists() {
            return Err(EngineError::Config(format!(
                "local data file {} does not exist",
                path.display()
            )));
        }
        csv_io::read_table(path)
    }
}
