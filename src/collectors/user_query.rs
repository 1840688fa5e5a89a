//! User supplied query (`query.json` in the query directory)
//!
//! Only a single `date_histogram` aggregation can be flattened. In live mode
//! the `@timestamp` range and the histogram bounds are rewritten to the
//! rolling window.

use std::path::Path;

use serde_json::{Value, json};
use tracing::debug;

use super::Collector;
use crate::error::{EngineError, EngineResult};
use crate::formatter;
use crate::frame::MetricFrame;
use crate::query::DomainQuery;

pub const QUERY_FILE: &str = "query.json";

/// Name of the single histogram aggregation, or an unsupported-query error.
pub fn validate(body: &Value) -> EngineResult<String> {
    let aggs = body
        .get("aggs")
        .or_else(|| body.get("aggregations"))
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::UnsupportedQuery("query has no aggregations".into()))?;

    let mut entries = aggs.iter();
    let (Some((name, aggregation)), None) = (entries.next(), entries.next()) else {
        return Err(EngineError::UnsupportedQuery(format!(
            "expected exactly one aggregation, found {}",
            aggs.len()
        )));
    };

    if aggregation.get("date_histogram").is_none() {
        return Err(EngineError::UnsupportedQuery(format!(
            "aggregation '{name}' is not a date_histogram"
        )));
    }
    Ok(name.clone())
}

fn patch_ranges(value: &mut Value, from: &Value, to: &Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut patched = 0;
            if let Some(range) = map
                .get_mut("range")
                .and_then(|r| r.get_mut("@timestamp"))
                .and_then(Value::as_object_mut)
            {
                for bound in ["gt", "gte", "lt", "lte"] {
                    range.remove(bound);
                }
                range.insert("gte".into(), from.clone());
                range.insert("lt".into(), to.clone());
                patched += 1;
            }
            for (key, child) in map.iter_mut() {
                if key != "range" {
                    patched += patch_ranges(child, from, to);
                }
            }
            patched
        }
        Value::Array(items) => items.iter_mut().map(|v| patch_ranges(v, from, to)).sum(),
        _ => 0,
    }
}

/// Point the query at the rolling window of `query`.
pub fn patch_window(body: &mut Value, aggregation: &str, query: &DomainQuery) -> EngineResult<()> {
    let range = query.range();
    let (from, to) = (range["gte"].clone(), range["lt"].clone());

    let patched = body
        .get_mut("query")
        .map_or(0, |q| patch_ranges(q, &from, &to));
    if patched == 0 {
        return Err(EngineError::UnsupportedQuery(
            "query has no @timestamp range to adjust".into(),
        ));
    }

    let aggs_key = if body.get("aggs").is_some() { "aggs" } else { "aggregations" };
    if let Some(histogram) = body
        .get_mut(aggs_key)
        .and_then(|a| a.get_mut(aggregation))
        .and_then(|a| a.get_mut("date_histogram"))
        .and_then(Value::as_object_mut)
    {
        histogram.insert("extended_bounds".into(), json!({ "min": from, "max": to }));
    }
    Ok(())
}

pub(super) async fn collect(
    collector: &Collector,
    query_dir: &Path,
    query: &DomainQuery,
) -> EngineResult<MetricFrame> {
    let path = query_dir.join(QUERY_FILE);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut body: Value = serde_json::from_str(&raw).map_err(|e| {
        EngineError::UnsupportedQuery(format!("{} is not valid JSON: {e}", path.display()))
    })?;

    let aggregation = validate(&body)?;
    if query.is_live() {
        patch_window(&mut body, &aggregation, query)?;
    }
    debug!("running user query with aggregation '{aggregation}'");

    let response = collector.search(&body).await?;
    formatter::discovered_frame(&response, &aggregation)
}
