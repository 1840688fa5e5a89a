//! Elasticsearch query bodies for metric acquisition

use serde_json::{Value, json};

/// Name of the date histogram in every generated query
pub const HISTOGRAM_AGG: &str = "metrics";

/// Hits fetched when discovering process names on a node
pub const DISCOVERY_SIZE: u32 = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum TimeBound {
    /// Date math such as `now-10m` or `now`
    Relative(String),
    EpochMillis(i64),
}

impl TimeBound {
    fn to_json(&self) -> Value {
        match self {
            TimeBound::Relative(expr) => json!(expr),
            TimeBound::EpochMillis(ms) => json!(ms),
        }
    }
}

/// What to fetch: node set, `[from, to)` window, bucket size and hit size
#[derive(Debug, Clone, PartialEq)]
pub struct DomainQuery {
    pub from: TimeBound,
    pub to: TimeBound,
    pub qinterval: String,
    pub size: u32,
    pub nodes: Vec<String>,
}

impl DomainQuery {
    /// Rolling window ending now, used by detection and point checks.
    pub fn live(window: &str, qinterval: &str, size: u32, nodes: Vec<String>) -> Self {
        Self {
            from: TimeBound::Relative(format!("now-{window}")),
            to: TimeBound::Relative("now".to_string()),
            qinterval: qinterval.to_string(),
            size,
            nodes,
        }
    }

    /// Fixed window in epoch milliseconds, used by training.
    pub fn historical(from: i64, to: i64, qinterval: &str, size: u32, nodes: Vec<String>) -> Self {
        Self {
            from: TimeBound::EpochMillis(from),
            to: TimeBound::EpochMillis(to),
            qinterval: qinterval.to_string(),
            size,
            nodes,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.to, TimeBound::Relative(_))
    }

    pub fn range(&self) -> Value {
        json!({
            "gte": self.from.to_json(),
            "lt": self.to.to_json(),
            "format": "epoch_millis"
        })
    }
}

/// Column name in the resulting frame and the document field it averages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricField {
    pub column: &'static str,
    pub field: &'static str,
}

pub const fn field(column: &'static str, field: &'static str) -> MetricField {
    MetricField { column, field }
}

fn filtered(query_string: &str, query: &DomainQuery) -> Value {
    json!({
        "bool": {
            "must": [
                { "query_string": { "query": query_string, "analyze_wildcard": true } }
            ],
            "filter": [
                { "range": { "@timestamp": query.range() } }
            ]
        }
    })
}

/// Date histogram with one `avg` per metric field.
pub fn histogram(query_string: &str, query: &DomainQuery, fields: &[MetricField]) -> Value {
    let metrics: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.column.to_string(), json!({ "avg": { "field": f.field } })))
        .collect();

    json!({
        "size": query.size,
        "query": filtered(query_string, query),
        "aggs": {
            HISTOGRAM_AGG: {
                "date_histogram": {
                    "field": "@timestamp",
                    "fixed_interval": query.qinterval,
                    "min_doc_count": 1,
                    "extended_bounds": { "min": query.from.to_json(), "max": query.to.to_json() }
                },
                "aggs": metrics
            }
        }
    })
}

/// Plain hit search, sorted by time.
pub fn hits(query_string: &str, query: &DomainQuery, size: u32) -> Value {
    json!({
        "size": size,
        "sort": [{ "@timestamp": { "order": "asc" } }],
        "query": filtered(query_string, query)
    })
}

/// Hits carrying only the process name, for per-process discovery.
pub fn process_discovery(query_string: &str, query: &DomainQuery) -> Value {
    let mut body = hits(query_string, query, DISCOVERY_SIZE);
    body["_source"] = json!(["ProcessName"]);
    body
}
