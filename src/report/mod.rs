//! Anomaly reporting
//!
//! Batches are stamped with the report time right before dispatch and sent
//! to one of two targets, chosen per call:
//!
//! - **Store**: the anomaly index of the Elasticsearch cluster
//! - **Messaging**: a Kafka topic behind a REST proxy
//!
//! A Grafana annotation can be pushed as a secondary effect. Its failures are
//! logged and never reach the caller.

pub mod grafana;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::AnomalyBatch;
use crate::config::ConnectorConfig;
use crate::error::{EngineError, EngineResult};
use crate::util::report_timestamp;

pub use grafana::GrafanaAnnotator;

const KAFKA_JSON: &str = "application/vnd.kafka.json.v2+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Store,
    Messaging,
}

impl Channel {
    pub fn select(messaging: bool) -> Self {
        if messaging {
            Channel::Messaging
        } else {
            Channel::Store
        }
    }
}

/// Destination of anomaly batches
#[async_trait]
pub trait AnomalySink: Send + Sync {
    async fn report(&self, batch: AnomalyBatch, channel: Channel) -> EngineResult<()>;

    /// Drop and recreate the anomaly store, when the sink has one.
    async fn reset_index(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Stamp the report time onto `batch`.
pub fn stamp(mut batch: AnomalyBatch) -> AnomalyBatch {
    batch.report_timestamp = Some(report_timestamp(Utc::now()));
    batch
}

#[derive(Debug, Clone)]
struct StoreTarget {
    endpoint: String,
    index: String,
}

#[derive(Debug, Clone)]
struct MessagingTarget {
    rest_endpoint: String,
    topic: String,
}

/// HTTP sink used in production
pub struct ReportingSink {
    client: Client,
    store: Option<StoreTarget>,
    messaging: Option<MessagingTarget>,
    annotator: Option<GrafanaAnnotator>,
}

impl ReportingSink {
    pub fn new(connector: &ConnectorConfig) -> EngineResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            store: connector.elasticsearch.as_ref().map(|es| StoreTarget {
                endpoint: es.endpoint.trim_end_matches('/').to_string(),
                index: connector.anomaly_index.clone(),
            }),
            messaging: connector.kafka.as_ref().map(|kafka| MessagingTarget {
                rest_endpoint: kafka.rest_endpoint.trim_end_matches('/').to_string(),
                topic: kafka.topic.clone(),
            }),
            annotator: None,
        })
    }

    pub fn with_annotator(mut self, annotator: GrafanaAnnotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    async fn deliver(&self, request: RequestBuilder, target: &str) -> EngineResult<()> {
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Report(format!("{target}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Report(format!("{target}: HTTP {status}: {text}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AnomalySink for ReportingSink {
    #[instrument(skip(self, batch), fields(method = %batch.method, anomalies = batch.len()))]
    async fn report(&self, batch: AnomalyBatch, channel: Channel) -> EngineResult<()> {
        let batch = stamp(batch);

        match channel {
            Channel::Store => {
                let store = self
                    .store
                    .as_ref()
                    .ok_or_else(|| EngineError::Report("no anomaly store configured".into()))?;
                let url = format!("{}/{}/_doc", store.endpoint, store.index);
                self.deliver(self.client.post(&url).json(&batch), "anomaly store")
                    .await?;
            }
            Channel::Messaging => {
                let messaging = self.messaging.as_ref().ok_or_else(|| {
                    EngineError::Report("no messaging channel configured".into())
                })?;
                let url = format!("{}/topics/{}", messaging.rest_endpoint, messaging.topic);
                let body = serde_json::to_vec(&json!({ "records": [{ "value": &batch }] }))?;
                let request = self
                    .client
                    .post(&url)
                    .header(CONTENT_TYPE, KAFKA_JSON)
                    .body(body);
                self.deliver(request, "messaging channel").await?;
            }
        }
        info!("reported {} anomalies via {channel:?}", batch.len());

        if let Some(annotator) = &self.annotator {
            annotator.annotate(&batch).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reset_index(&self) -> EngineResult<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EngineError::Config("reset_index needs an anomaly store".into()))?;
        let url = format!("{}/{}", store.endpoint, store.index);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| EngineError::Report(format!("delete {}: {e}", store.index)))?;
        if !(response.status().is_success() || response.status() == StatusCode::NOT_FOUND) {
            return Err(EngineError::Report(format!(
                "delete {}: HTTP {}",
                store.index,
                response.status()
            )));
        }
        debug!("deleted anomaly index {}", store.index);

        self.deliver(self.client.put(&url), "anomaly index creation")
            .await?;
        info!("recreated anomaly index {}", store.index);
        Ok(())
    }
}

/// Sink keeping every batch in memory, for offline runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(Channel, AnomalyBatch)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches received so far, in order.
    pub fn batches(&self) -> Vec<(Channel, AnomalyBatch)> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AnomalySink for MemorySink {
    async fn report(&self, batch: AnomalyBatch, channel: Channel) -> EngineResult<()> {
        let batch = stamp(batch);
        self.batches
            .lock()
            .map_err(|_| EngineError::Report("memory sink lock poisoned".into()))?
            .push((channel, batch));
        Ok(())
    }
}
