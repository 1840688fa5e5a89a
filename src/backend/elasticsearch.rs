use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, trace};

use super::MonitoringBackend;
use crate::config::ElasticsearchConfig;
use crate::error::{EngineError, EngineResult};

const NODE_LIST_SIZE: u32 = 1000;

/// Elasticsearch connector
///
/// The HTTP client is built once and reused for every query.
#[derive(Debug, Clone)]
pub struct ElasticsearchBackend {
    client: Client,
    endpoint: String,
    index: String,
    control: Option<String>,
    host_field: String,
}

impl ElasticsearchBackend {
    pub fn new(config: &ElasticsearchConfig) -> EngineResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            control: config
                .control
                .as_ref()
                .map(|c| c.trim_end_matches('/').to_string()),
            host_field: config.host_field.clone(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> EngineResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Backend(format!("HTTP {status}: {text}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MonitoringBackend for ElasticsearchBackend {
    #[instrument(skip(self, body), fields(index = %self.index))]
    async fn agg_query(&self, body: &Value) -> EngineResult<Value> {
        let url = format!("{}/{}/_search", self.endpoint, self.index);
        trace!("querying {url}");
        self.send(self.client.post(&url).json(body)).await
    }

    #[instrument(skip(self))]
    async fn node_list(&self) -> EngineResult<Vec<String>> {
        let body = json!({
            "size": 0,
            "aggs": {
                "hosts": { "terms": { "field": self.host_field, "size": NODE_LIST_SIZE } }
            }
        });
        let response = self.agg_query(&body).await?;

        let buckets = response
            .pointer("/aggregations/hosts/buckets")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::Backend("node list response has no buckets".into()))?;

        let nodes: Vec<String> = buckets
            .iter()
            .filter_map(|b| b.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        debug!("registered nodes: {nodes:?}");
        Ok(nodes)
    }

    #[instrument(skip(self))]
    async fn interval(&self) -> EngineResult<HashMap<String, u64>> {
        let Some(control) = &self.control else {
            return Ok(HashMap::new());
        };
        let url = format!("{control}/dmon/v1/overlord/aux/interval");
        let response = self.send(self.client.get(&url)).await?;

        let Some(entries) = response.as_object() else {
            return Err(EngineError::Backend("interval response is not an object".into()));
        };

        Ok(entries
            .iter()
            .filter_map(|(domain, value)| {
                let seconds = value
                    .as_u64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))?;
                Some((domain.clone(), seconds))
            })
            .collect())
    }

    async fn health(&self) -> EngineResult<String> {
        let url = format!("{}/_cluster/health", self.endpoint);
        let response = self.send(self.client.get(&url)).await?;
        Ok(response
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, control: bool) -> ElasticsearchBackend {
        ElasticsearchBackend::new(&ElasticsearchConfig {
            endpoint: server.uri(),
            index: "logstash-*".into(),
            control: control.then(|| server.uri()),
            host_field: "host".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_agg_query_posts_to_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logstash-*/_search"))
            .and(body_partial_json(json!({ "size": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend(&server, false)
            .agg_query(&json!({ "size": 0 }))
            .await
            .unwrap();
        assert_eq!(response, json!({ "hits": {} }));
    }

    #[tokio::test]
    async fn test_node_list_reads_terms_buckets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logstash-*/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aggregations": { "hosts": { "buckets": [
                    { "key": "node1", "doc_count": 4 },
                    { "key": "node2", "doc_count": 2 }
                ] } }
            })))
            .mount(&server)
            .await;

        let nodes = backend(&server, false).node_list().await.unwrap();
        assert_eq!(nodes, vec!["node1", "node2"]);
    }

    #[tokio::test]
    async fn test_interval_without_control_endpoint_is_empty() {
        let server = MockServer::start().await;
        let intervals = backend(&server, false).interval().await.unwrap();
        assert!(intervals.is_empty());
    }

    #[tokio::test]
    async fn test_interval_from_control_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dmon/v1/overlord/aux/interval"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "System": "15", "YARN": 30 })),
            )
            .mount(&server)
            .await;

        let intervals = backend(&server, true).interval().await.unwrap();
        assert_eq!(intervals.get("System"), Some(&15));
        assert_eq!(intervals.get("YARN"), Some(&30));
    }

    #[tokio::test]
    async fn test_error_status_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let result = backend(&server, false).agg_query(&json!({})).await;
        assert_matches!(result, Err(EngineError::Backend(_)));
    }
}
