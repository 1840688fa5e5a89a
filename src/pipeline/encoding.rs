//! One-hot encoding of categorical columns

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineResult;
use crate::frame::{Cell, MetricFrame};

/// Categories seen per encoded column, in encoding order.
///
/// Kept so that detection frames can be encoded with exactly the columns the
/// model was trained on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub categories: Vec<(String, Vec<String>)>,
}

impl OneHotEncoder {
    pub fn fit(frame: &MetricFrame, columns: &[String]) -> Self {
        let categories = columns
            .iter()
            .filter_map(|name| {
                let Some(column) = frame.column(name) else {
                    warn!("categorical column '{name}' not in frame, skipping");
                    return None;
                };
                let values: BTreeSet<String> = column
                    .cells
                    .iter()
                    .filter(|c| !c.is_null())
                    .map(Cell::render)
                    .collect();
                Some((name.clone(), values.into_iter().collect()))
            })
            .collect();
        Self { categories }
    }

    /// Replace every encoded column by one `{column}_{value}` indicator per
    /// category. Values not seen while fitting encode as all zeros.
    pub fn transform(&self, frame: &mut MetricFrame) -> EngineResult<()> {
        for (name, values) in &self.categories {
            let source = frame.remove_column(name);
            let rendered: Vec<String> = match &source {
                Some(column) => column.cells.iter().map(Cell::render).collect(),
                None => vec![String::new(); frame.len()],
            };
            for value in values {
                let indicator = rendered
                    .iter()
                    .map(|cell| Some(if cell == value { 1.0 } else { 0.0 }));
                frame.push_numeric(format!("{name}_{value}"), indicator)?;
            }
        }
        Ok(())
    }

    pub fn fit_transform(frame: &mut MetricFrame, columns: &[String]) -> EngineResult<Self> {
        let encoder = Self::fit(frame, columns);
        encoder.transform(frame)?;
        Ok(encoder)
    }

    pub fn encoded_columns(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| format!("{name}_{v}")))
            .collect()
    }
}
