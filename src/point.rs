//! Point anomalies: stateless threshold rules over short rolling windows
//!
//! Each metric category (load, network, memory) has its own threshold table.
//! A missing table falls back to built-in defaults with a warning.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::AnomalyRecord;
use crate::config::PointConfig;
use crate::error::{EngineError, EngineResult};
use crate::frame::MetricFrame;

/// Direction of a threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    /// Flag values greater than the threshold
    Gd,
    /// Flag values lower than the threshold
    Ld,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Kept as a string to match the configuration format
    pub threshold: String,
    pub bound: Bound,
}

impl ThresholdRule {
    pub fn new(threshold: impl ToString, bound: Bound) -> Self {
        Self {
            threshold: threshold.to_string(),
            bound,
        }
    }
}

pub type ThresholdTable = BTreeMap<String, ThresholdRule>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricCategory {
    Load,
    Network,
    Memory,
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricCategory::Load => "load",
            MetricCategory::Network => "network",
            MetricCategory::Memory => "memory",
        };
        write!(f, "{name}")
    }
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 3] = [
        MetricCategory::Load,
        MetricCategory::Network,
        MetricCategory::Memory,
    ];

    pub fn default_table(&self) -> ThresholdTable {
        let rules: &[(&str, &str, Bound)] = match self {
            MetricCategory::Load => &[
                ("shortterm", "4.5", Bound::Gd),
                ("midterm", "3.5", Bound::Gd),
                ("longterm", "3.0", Bound::Gd),
            ],
            MetricCategory::Network => &[
                ("rx", "1000000000", Bound::Gd),
                ("tx", "1000000000", Bound::Gd),
            ],
            MetricCategory::Memory => &[
                ("cached", "231313", Bound::Gd),
                ("buffered", "200000000", Bound::Gd),
                ("used", "1000000000", Bound::Gd),
                ("free", "100000000", Bound::Ld),
            ],
        };
        rules
            .iter()
            .map(|(metric, threshold, bound)| (metric.to_string(), ThresholdRule::new(threshold, *bound)))
            .collect()
    }

    fn configured<'a>(&self, config: &'a PointConfig) -> Option<&'a ThresholdTable> {
        match self {
            MetricCategory::Load => config.load.as_ref(),
            MetricCategory::Network => config.network.as_ref(),
            MetricCategory::Memory => config.memory.as_ref(),
        }
    }
}

/// Flag every row of every column belonging to `metric`.
///
/// A column belongs to a metric when it is named after it, or after it with
/// a `_` suffix (per-node columns such as `cached_node1`). Checks are strict:
/// a value equal to the threshold is never flagged. Missing cells are skipped.
pub fn evaluate(
    frame: &MetricFrame,
    metric: &str,
    threshold: f64,
    lower_bound: bool,
) -> Vec<AnomalyRecord> {
    let prefix = format!("{metric}_");
    let columns: Vec<_> = frame
        .columns()
        .iter()
        .filter(|c| c.name == metric || c.name.starts_with(&prefix))
        .collect();

    let mut records = Vec::new();
    for (row, ts) in frame.index().iter().enumerate() {
        for column in &columns {
            let Some(value) = column.cells[row].as_f64() else {
                continue;
            };
            let flagged = if lower_bound {
                value < threshold
            } else {
                value > threshold
            };
            if flagged {
                records.push(AnomalyRecord::at_millis(*ts).with_kind(&column.name));
            }
        }
    }
    records
}

#[derive(Debug, Clone)]
struct ResolvedRule {
    category: MetricCategory,
    metric: String,
    threshold: f64,
    bound: Bound,
}

/// Threshold rules of all categories, resolved from configuration once.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    rules: Vec<ResolvedRule>,
    defaulted: Vec<MetricCategory>,
}

impl ThresholdEvaluator {
    pub fn from_config(config: &PointConfig) -> EngineResult<Self> {
        let mut rules = Vec::new();
        let mut defaulted = Vec::new();

        for category in MetricCategory::ALL {
            let table = match category.configured(config) {
                Some(table) => table.clone(),
                None => {
                    warn!("no {category} thresholds configured, using defaults");
                    defaulted.push(category);
                    category.default_table()
                }
            };

            for (metric, rule) in table {
                let threshold = rule.threshold.trim().parse::<f64>().map_err(|_| {
                    EngineError::Config(format!(
                        "threshold '{}' for {category}.{metric} is not a number",
                        rule.threshold
                    ))
                })?;
                rules.push(ResolvedRule {
                    category,
                    metric,
                    threshold,
                    bound: rule.bound,
                });
            }
        }

        Ok(Self { rules, defaulted })
    }

    /// Categories that fell back to the built-in defaults
    pub fn defaulted(&self) -> &[MetricCategory] {
        &self.defaulted
    }

    /// Evaluate every category in turn and gather all flagged rows into one
    /// list. A row flagged by two categories appears once per category.
    pub fn evaluate_all(&self, frame: &MetricFrame) -> Vec<AnomalyRecord> {
        let mut records = Vec::new();
        for rule in &self.rules {
            let flagged = evaluate(frame, &rule.metric, rule.threshold, rule.bound == Bound::Ld);
            if !flagged.is_empty() {
                debug!(
                    "{} {}: {} rows beyond {}",
                    rule.category,
                    rule.metric,
                    flagged.len(),
                    rule.threshold
                );
            }
            records.extend(flagged);
        }
        records
    }
}
