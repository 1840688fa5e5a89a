//! Gaussian naive Bayes
//!
//! Supervised: the training frame carries a label column. The anomaly label
//! follows the trained classes: `1` for a `{0, 1}` target, `-1` otherwise.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AnomalyModel, FeatureMatrix, MethodSpec, ModelFamily, parse_settings};
use crate::error::{EngineError, EngineResult};

pub const METHOD: &str = "naivebayes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesSettings {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for NaiveBayesSettings {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    label: i32,
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    settings: NaiveBayesSettings,
    classes: Vec<ClassStats>,
}

pub fn spec() -> MethodSpec {
    MethodSpec {
        family: ModelFamily::Classification,
        create,
        restore,
    }
}

fn create(settings: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
    Ok(Box::new(GaussianNaiveBayes::new(parse_settings(METHOD, settings)?)))
}

fn restore(artifact: &Value) -> EngineResult<Box<dyn AnomalyModel>> {
    let model: GaussianNaiveBayes = serde_json::from_value(artifact.clone())?;
    Ok(Box::new(model))
}

fn fit_error(reason: impl Into<String>) -> EngineError {
    EngineError::Fit {
        method: METHOD.to_string(),
        reason: reason.into(),
    }
}

impl GaussianNaiveBayes {
    pub fn new(settings: NaiveBayesSettings) -> Self {
        Self {
            settings,
            classes: Vec::new(),
        }
    }

    fn log_likelihood(class: &ClassStats, row: &[f64]) -> f64 {
        class.log_prior
            + row
                .iter()
                .zip(class.means.iter().zip(&class.variances))
                .map(|(x, (mean, var))| {
                    -0.5 * (2.0 * std::f64::consts::PI * var).ln() - (x - mean).powi(2) / (2.0 * var)
                })
                .sum::<f64>()
    }
}

impl AnomalyModel for GaussianNaiveBayes {
    fn method(&self) -> &str {
        METHOD
    }

    fn fit(&mut self, features: &FeatureMatrix, target: Option<&[i32]>) -> EngineResult<()> {
        let target = target.ok_or_else(|| fit_error("a target column is required"))?;
        if target.len() != features.len() {
            return Err(fit_error(format!(
                "{} labels for {} rows",
                target.len(),
                features.len()
            )));
        }
        if features.is_empty() {
            return Err(fit_error("no training rows"));
        }

        let (_, stds) = features.moments();
        let max_var = stds.iter().map(|s| s * s).fold(0.0, f64::max);
        let epsilon = (self.settings.var_smoothing * max_var).max(f64::MIN_POSITIVE);

        let mut labels: Vec<i32> = target.to_vec();
        labels.sort_unstable();
        labels.dedup();

        let n = features.len() as f64;
        self.classes = labels
            .into_iter()
            .map(|label| {
                let members: Vec<&Vec<f64>> = features
                    .rows
                    .iter()
                    .zip(target)
                    .filter(|(_, t)| **t == label)
                    .map(|(row, _)| row)
                    .collect();
                let count = members.len() as f64;
                let means: Vec<f64> = (0..features.width())
                    .map(|j| members.iter().map(|r| r[j]).sum::<f64>() / count)
                    .collect();
                let variances = (0..features.width())
                    .map(|j| {
                        members.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / count
                            + epsilon
                    })
                    .collect();
                ClassStats {
                    label,
                    log_prior: (count / n).ln(),
                    means,
                    variances,
                }
            })
            .collect();
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EngineResult<Vec<i32>> {
        let width = self.classes.first().map_or(0, |c| c.means.len());
        if self.classes.is_empty() || features.width() != width {
            return Err(EngineError::Predict {
                method: METHOD.to_string(),
                reason: format!("model expects {width} features, got {}", features.width()),
            });
        }
        Ok(features
            .rows
            .iter()
            .map(|row| {
                self.classes
                    .iter()
                    .map(|c| (c.label, Self::log_likelihood(c, row)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map_or(0, |(label, _)| label)
            })
            .collect())
    }

    fn anomaly_label(&self) -> Option<i32> {
        if self.classes.is_empty() {
            return None;
        }
        let zero_one = self.classes.iter().all(|c| c.label == 0 || c.label == 1);
        Some(if zero_one { 1 } else { -1 })
    }

    fn to_artifact(&self) -> EngineResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
