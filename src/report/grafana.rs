use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use crate::config::GrafanaConfig;
use crate::error::{EngineError, EngineResult};
use crate::util::get_grafana_token;
use crate::{AnomalyBatch, AnomalyRecord};

const DASHBOARD_TITLE: &str = "EDE Anomalies";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(rename = "dashboardUID")]
    pub dashboard_uid: String,
    /// Epoch milliseconds
    pub time: i64,
    pub tags: Vec<String>,
    pub text: String,
}

impl Annotation {
    pub fn new(dashboard_uid: &str, batch: &AnomalyBatch, record: &AnomalyRecord) -> Self {
        let tag = match &record.kind {
            Some(kind) => format!("{kind}_{}_anomaly", batch.method),
            None => format!("{}_anomaly", batch.method),
        };
        Self {
            dashboard_uid: dashboard_uid.to_string(),
            time: record.utc * 1000,
            tags: vec![tag],
            text: format!(
                "Anomalies detected with method {}, model: {}",
                batch.method,
                batch.model.as_deref().unwrap_or("none")
            ),
        }
    }
}

/// Pushes anomalies to a Grafana dashboard as annotations
///
/// The dashboard is found by tag and created on first use when missing.
#[derive(Debug)]
pub struct GrafanaAnnotator {
    client: Client,
    url: String,
    token: Option<String>,
    tag: String,
    dashboard: Mutex<Option<String>>,
}

impl GrafanaAnnotator {
    pub fn new(config: &GrafanaConfig) -> EngineResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: get_grafana_token(config.token.as_deref()),
            tag: config.tag.clone(),
            dashboard: Mutex::new(None),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> EngineResult<Value> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Report(format!("grafana HTTP {status}: {text}")));
        }
        Ok(response.json().await?)
    }

    async fn find_dashboard(&self) -> EngineResult<Option<String>> {
        let url = format!("{}/api/search", self.url);
        let found = self
            .send(self.client.get(&url).query(&[("tag", self.tag.as_str())]))
            .await?;
        Ok(found
            .as_array()
            .and_then(|dashboards| dashboards.first())
            .and_then(|d| d.get("uid"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn create_dashboard(&self) -> EngineResult<String> {
        let url = format!("{}/api/dashboards/db", self.url);
        let body = json!({
            "dashboard": {
                "id": null,
                "uid": null,
                "title": DASHBOARD_TITLE,
                "tags": [self.tag],
                "timezone": "browser",
                "schemaVersion": 16
            },
            "overwrite": false
        });
        let created = self.send(self.client.post(&url).json(&body)).await?;
        let uid = created
            .get("uid")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Report("grafana did not return a dashboard uid".into()))?;
        info!("created grafana dashboard {uid}");
        Ok(uid.to_string())
    }

    async fn dashboard_uid(&self) -> EngineResult<String> {
        if let Some(uid) = self.dashboard.lock().ok().and_then(|d| d.clone()) {
            return Ok(uid);
        }
        let uid = match self.find_dashboard().await? {
            Some(uid) => uid,
            None => self.create_dashboard().await?,
        };
        if let Ok(mut cached) = self.dashboard.lock() {
            *cached = Some(uid.clone());
        }
        Ok(uid)
    }

    /// Post one annotation per anomaly. Never fails, errors are logged.
    #[instrument(skip(self, batch), fields(method = %batch.method))]
    pub async fn annotate(&self, batch: &AnomalyBatch) {
        let uid = match self.dashboard_uid().await {
            Ok(uid) => uid,
            Err(e) => {
                error!("Failed to resolve grafana dashboard: {e}");
                return;
            }
        };

        let url = format!("{}/api/annotations", self.url);
        let mut posted = 0;
        for record in &batch.anomalies {
            let annotation = Annotation::new(&uid, batch, record);
            match self.send(self.client.post(&url).json(&annotation)).await {
                Ok(_) => posted += 1,
                Err(e) => warn!("Failed to post grafana annotation: {e}"),
            }
        }
        debug!("posted {posted} of {} annotations", batch.len());
    }
}
