//! Isolation forest
//!
//! Random axis-aligned splits isolate outliers in fewer steps than inliers.
//! The anomaly score of a row is `2^(-E[h(x)] / c(psi))`; the score of the
//! `contamination` quantile of the training data is the decision threshold.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AnomalyModel, FeatureMatrix, MethodSpec, ModelFamily, parse_settings};
use crate::error::{EngineError, EngineResult};

pub const METHOD: &str = "isoforest";

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestSettings {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub random_state: Option<u64>,
}

impl Default for IsolationForestSettings {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.01,
            random_state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    settings: IsolationForestSettings,
    width: usize,
    sample_size: usize,
    /// Score at or above which a row is anomalous; `None` flags nothing
    threshold: Option<f64>,
    trees: Vec<Node>,
}

pub fn spec() -> MethodSpec {
    MethodSpec {
        family: ModelFamily::Clustering,
        create,
        restore,
    }
}

fn create(settings: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
    Ok(Box::new(IsolationForest::new(parse_settings(METHOD, settings)?)))
}

fn restore(artifact: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
    let forest: IsolationForest = serde_json::from_value(artifact.clone())?;
    Ok(Box::new(forest))
}

/// Average path length of an unsuccessful search in a binary tree of `n` nodes
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn grow(rows: &[&[f64]], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let width = rows[0].len();
    let candidates: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let min = rows.iter().map(|r| r[feature]).fold(f64::INFINITY, f64::min);
            let max = rows.iter().map(|r| r[feature]).fold(f64::NEG_INFINITY, f64::max);
            (min < max).then_some((feature, min, max))
        })
        .collect();
    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
        rows.iter().copied().partition(|r| r[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(&left, depth + 1, limit, rng)),
        right: Box::new(grow(&right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

impl IsolationForest {
    pub fn new(settings: IsolationForestSettings) -> Self {
        Self {
            settings,
            width: 0,
            sample_size: 0,
            threshold: None,
            trees: Vec::new(),
        }
    }

    fn score(&self, row: &[f64]) -> f64 {
        let norm = average_path(self.sample_size);
        if norm == 0.0 || self.trees.is_empty() {
            return 0.5;
        }
        let mean = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean / norm)
    }

    fn fit_error(reason: impl Into<String>) -> EngineError {
        EngineError::Fit {
            method: METHOD.to_string(),
            reason: reason.into(),
        }
    }
}

impl AnomalyModel for IsolationForest {
    fn method(&self) -> &str {
        METHOD
    }

    fn fit(&mut self, features: &FeatureMatrix, _target: Option<&[i32]>) -> EngineResult<()> {
        if features.is_empty() {
            return Err(Self::fit_error("no training rows"));
        }
        if self.settings.n_estimators == 0 || self.settings.max_samples == 0 {
            return Err(Self::fit_error("n_estimators and max_samples must be positive"));
        }
        if !(0.0..=0.5).contains(&self.settings.contamination) {
            return Err(Self::fit_error("contamination must be within [0, 0.5]"));
        }

        let mut rng = match self.settings.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let n = features.len();
        self.width = features.width();
        self.sample_size = self.settings.max_samples.min(n);
        let limit = (self.sample_size as f64).log2().ceil().max(1.0) as usize;

        self.trees = (0..self.settings.n_estimators)
            .map(|_| {
                let sample: Vec<&[f64]> = index::sample(&mut rng, n, self.sample_size)
                    .into_iter()
                    .map(|row| features.rows[row].as_slice())
                    .collect();
                grow(&sample, 0, limit, &mut rng)
            })
            .collect();

        let mut scores: Vec<f64> = features.rows.iter().map(|r| self.score(r)).collect();
        scores.sort_by(|a, b| b.total_cmp(a));
        let flagged = (self.settings.contamination * n as f64).ceil() as usize;
        self.threshold = match flagged {
            0 => None,
            k => Some(scores[k.min(n) - 1]),
        };
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EngineResult<Vec<i32>> {
        if features.width() != self.width {
            return Err(EngineError::Predict {
                method: METHOD.to_string(),
                reason: format!(
                    "model expects {} features, got {}",
                    self.width,
                    features.width()
                ),
            });
        }
        Ok(features
            .rows
            .iter()
            .map(|row| {
                let score = self.score(row);
                if self.threshold.is_some_and(|t| score >= t) { -1 } else { 1 }
            })
            .collect())
    }

    fn anomaly_label(&self) -> Option<i32> {
        Some(-1)
    }

    fn to_artifact(&self) -> EngineResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
