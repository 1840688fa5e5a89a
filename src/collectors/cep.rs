//! Event correlation feed
//!
//! Complex event processing output is stored as plain documents, so this
//! collector runs a hit search instead of a histogram and turns each hit
//! into one row.

use serde_json::Value;
use tracing::warn;

use super::Collector;
use crate::error::{EngineError, EngineResult};
use crate::formatter;
use crate::frame::{Cell, MetricFrame, TIME_INDEX};
use crate::query::{self, DomainQuery};
use crate::util::{epoch_to_millis, parse_timestamp_millis};

const CEP_QUERY: &str = "Component:*";

const DEFAULT_SIZE: u32 = 10_000;

const TEXT_FIELDS: [&str; 4] = ["Component", "host", "ship", "method"];

fn to_cell(value: Option<&Value>) -> Cell {
    match value {
        Some(Value::Number(n)) => n.as_f64().into(),
        Some(Value::String(s)) if !s.is_empty() => Cell::Text(s.clone()),
        _ => Cell::Null,
    }
}

/// Text field cell; numeric values keep their JSON spelling as text.
fn to_text_cell(value: Option<&Value>) -> Cell {
    match value {
        Some(Value::Number(n)) => Cell::Text(n.to_string()),
        other => to_cell(other),
    }
}

fn timestamp(source: &Value) -> Option<i64> {
    match source.get("@timestamp")? {
        Value::String(s) => parse_timestamp_millis(s),
        Value::Number(n) => n.as_f64().map(epoch_to_millis),
        _ => None,
    }
}

pub(super) async fn collect(collector: &Collector, query: &DomainQuery) -> EngineResult<MetricFrame> {
    let size = if query.size == 0 { DEFAULT_SIZE } else { query.size };
    let response = collector.search(&query::hits(CEP_QUERY, query, size)).await?;
    let hits = formatter::hits(&response)?;
    if hits.is_empty() {
        return Err(EngineError::EmptyResult("event correlation feed".into()));
    }

    let mut index = Vec::with_capacity(hits.len());
    let mut rows = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(source) = hit.get("_source") else {
            continue;
        };
        let Some(ts) = timestamp(source) else {
            warn!("event without usable @timestamp, skipping");
            continue;
        };
        index.push(ts);
        rows.push(source);
    }

    let mut frame = MetricFrame::with_index(TIME_INDEX, index);
    frame.push_column("ms", rows.iter().map(|s| to_cell(s.get("ms"))).collect())?;
    for field in TEXT_FIELDS {
        frame.push_column(field, rows.iter().map(|s| to_text_cell(s.get(field))).collect())?;
    }
    frame.sort_by_index();
    Ok(frame)
}
