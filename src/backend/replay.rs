//! Replay backend (no network)
//!
//! Answers queries from a list of canned responses. A response is chosen by
//! the first registered needle found in any string of the query body, so
//! routes can key on query strings such as `collectd_type:"load"`.
//! Unmatched queries get an empty aggregation.
//!
//! Every issued query is recorded, which makes the backend useful for
//! asserting query order in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::trace;

use super::MonitoringBackend;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Default)]
pub struct ReplayBackend {
    routes: Vec<(String, Value)>,
    failures: Vec<String>,
    nodes: Vec<String>,
    intervals: HashMap<String, u64>,
    issued: Mutex<Vec<Value>>,
}

impl ReplayBackend {
    pub fn new(nodes: impl IntoIterator<Item = impl ToString>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Answer queries containing `needle` with `response`.
    pub fn respond(mut self, needle: impl ToString, response: Value) -> Self {
        self.routes.push((needle.to_string(), response));
        self
    }

    /// Fail queries containing `needle` with a backend error.
    pub fn fail(mut self, needle: impl ToString) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    pub fn with_interval(mut self, domain: impl ToString, seconds: u64) -> Self {
        self.intervals.insert(domain.to_string(), seconds);
        self
    }

    /// Queries issued so far, in order.
    pub fn issued(&self) -> Vec<Value> {
        self.issued
            .lock()
            .map(|issued| issued.clone())
            .unwrap_or_default()
    }

    pub fn empty_response() -> Value {
        json!({ "hits": { "total": 0, "hits": [] }, "aggregations": {} })
    }
}

fn collect_strings(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.iter().for_each(|(k, v)| {
            out.push_str(k);
            out.push('\n');
            collect_strings(v, out);
        }),
        _ => {}
    }
}

#[async_trait]
impl MonitoringBackend for ReplayBackend {
    async fn agg_query(&self, body: &Value) -> EngineResult<Value> {
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(body.clone());
        }

        let mut haystack = String::new();
        collect_strings(body, &mut haystack);

        if let Some(needle) = self.failures.iter().find(|n| haystack.contains(n.as_str())) {
            return Err(EngineError::Backend(format!("replayed failure for '{needle}'")));
        }

        let response = self
            .routes
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, response)| response.clone());

        trace!("replay hit: {}", response.is_some());
        Ok(response.unwrap_or_else(Self::empty_response))
    }

    async fn node_list(&self) -> EngineResult<Vec<String>> {
        Ok(self.nodes.clone())
    }

    async fn interval(&self) -> EngineResult<HashMap<String, u64>> {
        Ok(self.intervals.clone())
    }

    async fn health(&self) -> EngineResult<String> {
        Ok("replay".to_string())
    }
}
