//! DBSCAN on standardised features
//!
//! Fitting keeps the core samples and their cluster ids. A row is assigned
//! the cluster of the first core sample within `eps`, otherwise it is noise
//! (`-1`). On the training data this reproduces the DBSCAN labelling.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AnomalyModel, FeatureMatrix, MethodSpec, ModelFamily, parse_settings};
use crate::error::{EngineError, EngineResult};

pub const METHOD: &str = "sdbscan";

const NOISE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbscanSettings {
    pub eps: f64,
    pub min_samples: usize,
}

impl Default for DbscanSettings {
    fn default() -> Self {
        Self {
            eps: 0.9,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dbscan {
    settings: DbscanSettings,
    means: Vec<f64>,
    stds: Vec<f64>,
    cores: Vec<Vec<f64>>,
    clusters: Vec<i32>,
}

pub fn spec() -> MethodSpec {
    MethodSpec {
        family: ModelFamily::Clustering,
        create,
        restore,
    }
}

fn create(settings: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
    Ok(Box::new(Dbscan::new(parse_settings(METHOD, settings)?)))
}

fn restore(artifact: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
    let model: Dbscan = serde_json::from_value(artifact.clone())?;
    Ok(Box::new(model))
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

impl Dbscan {
    pub fn new(settings: DbscanSettings) -> Self {
        Self {
            settings,
            means: Vec::new(),
            stds: Vec::new(),
            cores: Vec::new(),
            clusters: Vec::new(),
        }
    }

    fn standardise(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (mean, std))| (v - mean) / std)
            .collect()
    }
}

impl AnomalyModel for Dbscan {
    fn method(&self) -> &str {
        METHOD
    }

    fn fit(&mut self, features: &FeatureMatrix, _target: Option<&[i32]>) -> EngineResult<()> {
        if features.is_empty() {
            return Err(EngineError::Fit {
                method: METHOD.to_string(),
                reason: "no training rows".to_string(),
            });
        }

        let (means, stds) = features.moments();
        self.means = means;
        self.stds = stds.into_iter().map(|s| if s > 0.0 { s } else { 1.0 }).collect();

        let points: Vec<Vec<f64>> = features.rows.iter().map(|r| self.standardise(r)).collect();
        let eps = self.settings.eps;
        let neighbours: Vec<Vec<usize>> = points
            .iter()
            .map(|p| {
                (0..points.len())
                    .filter(|j| distance(p, &points[*j]) <= eps)
                    .collect()
            })
            .collect();
        let is_core: Vec<bool> = neighbours
            .iter()
            .map(|n| n.len() >= self.settings.min_samples)
            .collect();

        let mut labels = vec![NOISE; points.len()];
        let mut next = 0;
        for seed in 0..points.len() {
            if !is_core[seed] || labels[seed] != NOISE {
                continue;
            }
            labels[seed] = next;
            let mut queue = VecDeque::from([seed]);
            while let Some(point) = queue.pop_front() {
                for &neighbour in &neighbours[point] {
                    if is_core[neighbour] && labels[neighbour] == NOISE {
                        labels[neighbour] = next;
                        queue.push_back(neighbour);
                    }
                }
            }
            next += 1;
        }

        self.cores = Vec::new();
        self.clusters = Vec::new();
        for (point, label) in points.into_iter().zip(labels) {
            if label != NOISE {
                self.cores.push(point);
                self.clusters.push(label);
            }
        }
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EngineResult<Vec<i32>> {
        if features.width() != self.means.len() {
            return Err(EngineError::Predict {
                method: METHOD.to_string(),
                reason: format!(
                    "model expects {} features, got {}",
                    self.means.len(),
                    features.width()
                ),
            });
        }
        Ok(features
            .rows
            .iter()
            .map(|row| {
                let point = self.standardise(row);
                self.cores
                    .iter()
                    .position(|core| distance(core, &point) <= self.settings.eps)
                    .map_or(NOISE, |i| self.clusters[i])
            })
            .collect())
    }

    fn anomaly_label(&self) -> Option<i32> {
        Some(NOISE)
    }

    fn to_artifact(&self) -> EngineResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clustered() -> FeatureMatrix {
        let mut rows: Vec<Vec<f64>> = (0..20).map(|i| vec![(i % 5) as f64 * 0.02]).collect();
        rows.push(vec![50.0]);
        FeatureMatrix {
            names: vec!["load".into()],
            index: (0..rows.len() as i64).collect(),
            rows,
        }
    }

    #[test]
    fn test_far_point_is_noise() {
        let data = clustered();
        let mut model = Dbscan::new(DbscanSettings::default());
        model.fit(&data, None).unwrap();

        let predictions = model.predict(&data).unwrap();
        assert_eq!(predictions[20], NOISE);
        assert!(predictions[..20].iter().all(|p| *p == 0));
    }

    #[test]
    fn test_too_few_neighbours_means_no_clusters() {
        let data = clustered();
        let mut model = Dbscan::new(DbscanSettings {
            eps: 0.9,
            min_samples: 50,
        });
        model.fit(&data, None).unwrap();
        assert!(model.predict(&data).unwrap().iter().all(|p| *p == NOISE));
    }
}
