//! Flattening of backend responses into frames

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::frame::{Cell, MetricFrame, TIME_INDEX};
use crate::query::{HISTOGRAM_AGG, MetricField};

/// Bucket keys that are not metric columns
const BUCKET_META: [&str; 3] = ["key", "key_as_string", "doc_count"];

fn buckets<'a>(response: &'a Value, aggregation: &str) -> Option<&'a Vec<Value>> {
    response
        .get("aggregations")?
        .get(aggregation)?
        .get("buckets")?
        .as_array()
}

fn bucket_key(bucket: &Value) -> EngineResult<i64> {
    let key = bucket.get("key");
    key.and_then(Value::as_i64)
        .or_else(|| key.and_then(Value::as_f64).map(|k| k as i64))
        .ok_or_else(|| EngineError::Backend(format!("bucket without numeric key: {bucket}")))
}

fn metric_cell(bucket: &Value, column: &str) -> Cell {
    bucket
        .get(column)
        .and_then(|metric| metric.get("value"))
        .and_then(Value::as_f64)
        .into()
}

/// True when the response carries no histogram buckets at all.
pub fn is_empty_aggregation(response: &Value) -> bool {
    buckets(response, HISTOGRAM_AGG).is_none_or(|b| b.is_empty())
}

/// Flatten the generated date histogram, one column per metric field.
pub fn histogram_frame(response: &Value, fields: &[MetricField]) -> EngineResult<MetricFrame> {
    if response.get("aggregations").is_none() {
        return Err(EngineError::Backend("response has no aggregations".into()));
    }
    let empty = Vec::new();
    let buckets = buckets(response, HISTOGRAM_AGG).unwrap_or(&empty);

    let index = buckets.iter().map(bucket_key).collect::<EngineResult<Vec<_>>>()?;
    let mut frame = MetricFrame::with_index(TIME_INDEX, index);
    for field in fields {
        let cells = buckets.iter().map(|b| metric_cell(b, field.column)).collect();
        frame.push_column(field.column, cells)?;
    }
    frame.sort_by_index();
    Ok(frame)
}

/// Flatten a user supplied histogram whose sub-aggregations are not known
/// up front. Columns are the union of sub-aggregation names, sorted.
pub fn discovered_frame(response: &Value, aggregation: &str) -> EngineResult<MetricFrame> {
    let buckets = buckets(response, aggregation).ok_or_else(|| {
        EngineError::Backend(format!("response has no buckets for '{aggregation}'"))
    })?;

    let columns: BTreeSet<&str> = buckets
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|b| b.iter())
        .filter(|(name, value)| !BUCKET_META.contains(&name.as_str()) && value.get("value").is_some())
        .map(|(name, _)| name.as_str())
        .collect();

    let index = buckets.iter().map(bucket_key).collect::<EngineResult<Vec<_>>>()?;
    let mut frame = MetricFrame::with_index(TIME_INDEX, index);
    for column in columns {
        let cells = buckets.iter().map(|b| metric_cell(b, column)).collect();
        frame.push_column(column, cells)?;
    }
    frame.sort_by_index();
    Ok(frame)
}

/// Raw hits of a search response.
pub fn hits(response: &Value) -> EngineResult<&[Value]> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| EngineError::Backend("response has no hits".into()))
}

/// Distinct values of a `_source` field across hits, sorted.
pub fn distinct_source_values(hits: &[Value], field: &str) -> Vec<String> {
    hits.iter()
        .filter_map(|hit| hit.get("_source")?.get(field)?.as_str())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::field;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn response() -> Value {
        json!({
            "aggregations": { "metrics": { "buckets": [
                { "key": 2000, "doc_count": 3, "shortterm": { "value": 0.5 }, "midterm": { "value": null } },
                { "key": 1000, "doc_count": 3, "shortterm": { "value": 0.25 }, "midterm": { "value": 0.1 } }
            ] } }
        })
    }

    #[test]
    fn test_histogram_frame_orders_and_keeps_nulls() {
        let frame = histogram_frame(
            &response(),
            &[field("shortterm", "shortterm"), field("midterm", "midterm")],
        )
        .unwrap();

        assert_eq!(frame.index(), &[1000, 2000]);
        assert_eq!(frame.numeric("shortterm").unwrap(), vec![Some(0.25), Some(0.5)]);
        assert_eq!(frame.numeric("midterm").unwrap(), vec![Some(0.1), None]);
    }

    #[test]
    fn test_empty_aggregation_detection() {
        assert!(is_empty_aggregation(&json!({ "aggregations": {} })));
        assert!(is_empty_aggregation(
            &json!({ "aggregations": { "metrics": { "buckets": [] } } })
        ));
        assert!(!is_empty_aggregation(&response()));
    }

    #[test]
    fn test_missing_aggregations_is_backend_error() {
        assert!(histogram_frame(&json!({ "error": "boom" }), &[]).is_err());
    }

    #[test]
    fn test_discovered_frame_finds_sub_aggregations() {
        let frame = discovered_frame(&response(), "metrics").unwrap();
        assert_eq!(frame.column_names(), vec!["midterm", "shortterm"]);
    }

    #[test]
    fn test_distinct_source_values() {
        let hits = vec![
            json!({ "_source": { "ProcessName": "reduce" } }),
            json!({ "_source": { "ProcessName": "map" } }),
            json!({ "_source": { "ProcessName": "map" } }),
            json!({ "_source": {} }),
        ];
        assert_eq!(distinct_source_values(&hits, "ProcessName"), vec!["map", "reduce"]);
    }
}
