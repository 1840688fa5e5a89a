//! Feature attribution for detected anomalies

use crate::Attribution;
use crate::error::{EngineError, EngineResult};

use super::FeatureMatrix;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Explanation {
    /// One attribution per explained row, in the order requested
    pub rows: Vec<Attribution>,

    /// Mean attribution over the explained rows
    pub overall: Attribution,
}

/// Attribution backend. Failures are reported to the caller, who treats them
/// as a missing explanation.
pub trait Explainer: Send + Sync {
    fn explain(&self, features: &FeatureMatrix, rows: &[usize]) -> EngineResult<Explanation>;
}

/// Absolute z-score of every feature against the detection window
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviationExplainer;

impl Explainer for DeviationExplainer {
    fn explain(&self, features: &FeatureMatrix, rows: &[usize]) -> EngineResult<Explanation> {
        if features.is_empty() || features.width() == 0 {
            return Err(EngineError::Frame("nothing to explain".into()));
        }
        let (means, stds) = features.moments();

        let mut explanation = Explanation::default();
        for &row in rows {
            let values = features
                .rows
                .get(row)
                .ok_or_else(|| EngineError::Frame(format!("row {row} out of range")))?;
            let attribution: Attribution = features
                .names
                .iter()
                .enumerate()
                .map(|(j, name)| {
                    let score = if stds[j] > 0.0 {
                        ((values[j] - means[j]) / stds[j]).abs()
                    } else {
                        0.0
                    };
                    (name.clone(), score)
                })
                .collect();
            for (name, score) in &attribution {
                *explanation.overall.entry(name.clone()).or_default() += score / rows.len() as f64;
            }
            explanation.rows.push(attribution);
        }
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviating_feature_scores_highest() {
        let features = FeatureMatrix {
            names: vec!["cpu".into(), "mem".into()],
            rows: vec![
                vec![1.0, 5.0],
                vec![1.0, 5.0],
                vec![1.0, 5.0],
                vec![9.0, 5.0],
            ],
            index: vec![0, 1, 2, 3],
        };

        let explanation = DeviationExplainer.explain(&features, &[3]).unwrap();
        let row = &explanation.rows[0];
        assert!(row["cpu"] > 1.0);
        assert_eq!(row["mem"], 0.0);
        assert_eq!(explanation.overall, *row);
    }

    #[test]
    fn test_out_of_range_row_is_error() {
        let features = FeatureMatrix {
            names: vec!["cpu".into()],
            rows: vec![vec![1.0]],
            index: vec![0],
        };
        assert!(DeviationExplainer.explain(&features, &[5]).is_err());
    }
}
