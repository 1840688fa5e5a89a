//! Scaling and row-wise feature operations applied after filtering

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AugmentationConfig, Operation, OperationsConfig, ScalerKind};
use crate::error::{EngineError, EngineResult};
use crate::frame::{Cell, MetricFrame};

/// Per-column offset and scale, `(value - offset) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    pub kind: ScalerKind,
    pub columns: Vec<String>,
    pub offsets: Vec<f64>,
    pub scales: Vec<f64>,
}

impl FittedScaler {
    pub fn fit(kind: ScalerKind, frame: &MetricFrame) -> Self {
        let mut columns = Vec::new();
        let mut offsets = Vec::new();
        let mut scales = Vec::new();

        for column in frame.columns().iter().filter(|c| c.is_numeric()) {
            let values: Vec<f64> = column.cells.iter().filter_map(Cell::as_f64).collect();
            if values.is_empty() {
                continue;
            }
            let (offset, scale) = match kind {
                ScalerKind::Standard => {
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                        / values.len() as f64;
                    (mean, variance.sqrt())
                }
                ScalerKind::MinMax => {
                    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (min, max - min)
                }
            };
            columns.push(column.name.clone());
            offsets.push(offset);
            scales.push(if scale > 0.0 { scale } else { 1.0 });
        }

        Self {
            kind,
            columns,
            offsets,
            scales,
        }
    }

    pub fn transform(&self, frame: &mut MetricFrame) {
        for column in frame.columns_mut() {
            let Some(position) = self.columns.iter().position(|c| *c == column.name) else {
                continue;
            };
            let (offset, scale) = (self.offsets[position], self.scales[position]);
            for cell in &mut column.cells {
                if let Cell::Num(value) = cell {
                    *value = (*value - offset) / scale;
                }
            }
        }
    }

    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.scaler"))
    }

    pub fn save(&self, dir: &Path, name: &str) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path(dir, name);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(dir: &Path, name: &str) -> EngineResult<Self> {
        let path = Self::path(dir, name);
        let raw = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn operation_name(op: Operation) -> &'static str {
    match op {
        Operation::Mean => "mean",
        Operation::Sum => "sum",
        Operation::Max => "max",
        Operation::Min => "min",
        Operation::Std => "std",
    }
}

fn reduce(op: Operation, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    Some(match op {
        Operation::Sum => sum,
        Operation::Mean => sum / n,
        Operation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Operation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Operation::Std => {
            let mean = sum / n;
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
        }
    })
}

/// Add one row-wise column per operation over all numeric columns.
pub fn apply_operations(frame: &mut MetricFrame, ops: &OperationsConfig) -> EngineResult<()> {
    let (sources, rows) = frame.numeric_rows();
    if sources.is_empty() {
        return Err(EngineError::Config(
            "augmentation operations need numeric columns".into(),
        ));
    }

    let present: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| row.iter().flatten().copied().collect())
        .collect();

    if ops.remove_filtered {
        frame.retain_columns(|c| !sources.contains(&c.name));
    }
    for op in &ops.ops {
        let values = present.iter().map(|row| reduce(*op, row));
        frame.push_numeric(operation_name(*op), values)?;
    }
    debug!("computed {} operations over {} columns", ops.ops.len(), sources.len());
    Ok(())
}

/// Training side: fit and persist the scaler, then compute operations.
pub fn for_training(
    mut frame: MetricFrame,
    config: Option<&AugmentationConfig>,
    data_dir: &Path,
) -> EngineResult<MetricFrame> {
    let Some(config) = config else {
        return Ok(frame);
    };

    if let Some(kind) = config.scaler {
        let scaler = FittedScaler::fit(kind, &frame);
        scaler.transform(&mut frame);
        let path = scaler.save(data_dir, kind.name())?;
        info!("saved {} scaler to {}", kind.name(), path.display());
    }
    if let Some(ops) = &config.operations {
        apply_operations(&mut frame, ops)?;
    }
    Ok(frame)
}

/// Detection side: reuse a persisted scaler when one is configured. A scaler
/// that cannot be loaded leaves the data unscaled.
pub fn for_detection(
    mut frame: MetricFrame,
    config: Option<&AugmentationConfig>,
    scaler: Option<&str>,
    data_dir: &Path,
) -> EngineResult<MetricFrame> {
    if let Some(name) = scaler {
        match FittedScaler::load(data_dir, name) {
            Ok(scaler) => scaler.transform(&mut frame),
            Err(e) => warn!("could not load scaler '{name}': {e}, continuing unscaled"),
        }
    }
    if let Some(ops) = config.and_then(|c| c.operations.as_ref()) {
        apply_operations(&mut frame, ops)?;
    }
    Ok(frame)
}
