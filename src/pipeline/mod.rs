//! Filter and transform stages
//!
//! [`apply`] runs the configured stages in a fixed order over an acquired
//! frame:
//!
//! 1. column allow-list
//! 2. row bounds on a designated column
//! 3. column drop-list
//! 4. low-variance column removal
//! 5. missing value fill or row drop
//! 6. index assignment
//! 7. wildcard column filter
//! 8. one-hot encoding of categorical columns, reusing the training encoder
//!    when one is given
//! 9. persistence of the filtered frame (checkpoint mode only)
//!
//! Stages whose option is unset are skipped. A frame with no rows left is an
//! [`EngineError::EmptyResult`].

pub mod augment;
pub mod encoding;

use std::path::Path;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::config::{FillStrategy, PipelineConfig, RowFilter, WildcardFilter};
use crate::error::{EngineError, EngineResult};
use crate::frame::{Cell, MetricFrame, csv_io};

pub use encoding::OneHotEncoder;

/// Population variance at or below this marks a column as constant
pub const LOW_VARIANCE_CUTOFF: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Detect,
}

impl RunMode {
    pub fn filtered_file(&self) -> &'static str {
        match self {
            RunMode::Train => "pr_data_filtered.csv",
            RunMode::Detect => "pr_data_detect_filtered.csv",
        }
    }
}

/// Output of [`apply`]
#[derive(Debug, Clone)]
pub struct Filtered {
    pub frame: MetricFrame,

    /// Present when categorical columns were encoded
    pub encoder: Option<OneHotEncoder>,
}

pub fn select_columns(frame: &mut MetricFrame, allowed: &[String]) {
    for name in allowed.iter().filter(|n| !frame.has_column(n)) {
        warn!("column '{name}' not in frame, ignoring");
    }
    frame.retain_columns(|c| allowed.contains(&c.name));
}

/// Keep rows whose designated value lies within the bounds. Rows without a
/// value are kept.
pub fn filter_rows(frame: &mut MetricFrame, filter: &RowFilter) -> EngineResult<()> {
    if filter.lower == 0.0 && filter.upper == 0.0 {
        debug!("row filter has no bounds, skipping");
        return Ok(());
    }

    let values: Vec<Option<f64>> = if frame.index_name() == filter.column {
        frame.index().iter().map(|ts| Some(*ts as f64)).collect()
    } else {
        frame.numeric(&filter.column).ok_or_else(|| {
            EngineError::Config(format!("row filter column '{}' not found", filter.column))
        })?
    };

    let mask: Vec<bool> = values
        .iter()
        .map(|value| match value {
            Some(v) => {
                (filter.lower == 0.0 || *v >= filter.lower)
                    && (filter.upper == 0.0 || *v <= filter.upper)
            }
            None => true,
        })
        .collect();
    frame.retain_rows(&mask);
    Ok(())
}

pub fn drop_columns(frame: &mut MetricFrame, names: &[String]) {
    frame.retain_columns(|c| !names.contains(&c.name));
}

pub fn drop_low_variance(frame: &mut MetricFrame) {
    let mut removed = Vec::new();
    frame.retain_columns(|column| {
        if !column.is_numeric() {
            return true;
        }
        let values: Vec<f64> = column.cells.iter().filter_map(Cell::as_f64).collect();
        let keep = if values.is_empty() {
            false
        } else {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            variance > LOW_VARIANCE_CUTOFF
        };
        if !keep {
            removed.push(column.name.clone());
        }
        keep
    });
    if !removed.is_empty() {
        debug!("dropped low variance columns {removed:?}");
    }
}

pub fn fill_missing(frame: &mut MetricFrame, strategy: FillStrategy) {
    for column in frame.columns_mut() {
        if !column.is_numeric() {
            continue;
        }
        let fill = match strategy {
            FillStrategy::Zero => 0.0,
            FillStrategy::Mean => {
                let values: Vec<f64> = column.cells.iter().filter_map(Cell::as_f64).collect();
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
        };
        for cell in &mut column.cells {
            if cell.is_null() {
                *cell = Cell::Num(fill);
            }
        }
    }
}

/// Remove every row that has a missing cell.
pub fn drop_missing(frame: &mut MetricFrame) {
    let mask: Vec<bool> = (0..frame.len())
        .map(|row| frame.columns().iter().all(|c| !c.cells[row].is_null()))
        .collect();
    frame.retain_rows(&mask);
}

pub fn filter_wildcard(frame: &mut MetricFrame, filter: &WildcardFilter) -> EngineResult<()> {
    let pattern = filter
        .regex
        .as_deref()
        .ok_or_else(|| EngineError::Config("wildcard filter needs a regex".into()))?;
    let regex = Regex::new(pattern)
        .map_err(|e| EngineError::Config(format!("invalid wildcard regex '{pattern}': {e}")))?;

    frame.retain_columns(|c| regex.is_match(&c.name) == filter.keep);
    Ok(())
}

/// Run every configured stage over `frame`.
///
/// `index_column` overrides `config.index`. A fitted `encoder` replaces
/// fitting a new one, so detection frames get the training columns. When
/// `checkpoint_dir` is given, the filtered frame is written there under the
/// mode specific file name.
#[instrument(skip(frame, config, encoder, checkpoint_dir), fields(rows = frame.len(), columns = frame.width()))]
pub fn apply(
    mut frame: MetricFrame,
    config: &PipelineConfig,
    index_column: Option<&str>,
    mode: RunMode,
    encoder: Option<&OneHotEncoder>,
    checkpoint_dir: Option<&Path>,
) -> EngineResult<Filtered> {
    if let Some(allowed) = &config.columns {
        select_columns(&mut frame, allowed);
    }
    if let Some(rows) = &config.rows {
        filter_rows(&mut frame, rows)?;
    }
    if let Some(names) = &config.drop {
        drop_columns(&mut frame, names);
    }
    if config.low_variance {
        drop_low_variance(&mut frame);
    }
    if let Some(strategy) = config.fill {
        fill_missing(&mut frame, strategy);
    }
    if config.dropna {
        drop_missing(&mut frame);
    }
    if let Some(index) = index_column.or(config.index.as_deref()) {
        if frame.index_name() != index {
            frame.set_index(index)?;
        }
    }
    if let Some(wildcard) = &config.wildcard {
        filter_wildcard(&mut frame, wildcard)?;
    }
    let encoder = match (encoder, &config.categorical) {
        (Some(fitted), _) => {
            fitted.transform(&mut frame)?;
            Some(fitted.clone())
        }
        (None, Some(columns)) => Some(OneHotEncoder::fit_transform(&mut frame, columns)?),
        (None, None) => None,
    };

    if frame.is_empty() {
        return Err(EngineError::EmptyResult("filtering".into()));
    }

    if let Some(dir) = checkpoint_dir {
        let path = dir.join(mode.filtered_file());
        csv_io::write_csv(&frame, &path)?;
        info!("saved filtered frame to {}", path.display());
    }

    debug!("filtered to {} rows x {} columns", frame.len(), frame.width());
    Ok(Filtered { frame, encoder })
}
