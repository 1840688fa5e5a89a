//! CSV persistence for frames
//!
//! Checkpoint files carry the index as their first column. Numbers are
//! written with their shortest round-tripping representation and missing
//! cells as empty fields. Column types go to a `{stem}.schema.json` sidecar,
//! so a frame read back compares equal to the one written: a text cell
//! holding `42` or `NaN` stays text.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Cell, Column, MetricFrame};
use crate::error::{EngineError, EngineResult};
use crate::util::parse_timestamp_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
}

impl ColumnKind {
    fn of(column: &Column) -> Self {
        if column.is_numeric() {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }

    fn parse(self, raw: &str) -> Result<Cell, String> {
        if raw.is_empty() {
            return Ok(Cell::Null);
        }
        match self {
            ColumnKind::Text => Ok(Cell::Text(raw.to_string())),
            ColumnKind::Numeric => raw
                .parse::<f64>()
                .map(Cell::Num)
                .map_err(|_| format!("'{raw}' is not a number")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Schema {
    index: String,
    columns: Vec<(String, ColumnKind)>,
}

pub fn schema_path(path: &Path) -> PathBuf {
    path.with_extension("schema.json")
}

pub fn write_csv(frame: &MetricFrame, path: &Path) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let schema = Schema {
        index: frame.index_name().to_string(),
        columns: frame
            .columns()
            .iter()
            .map(|c| (c.name.clone(), ColumnKind::of(c)))
            .collect(),
    };
    std::fs::write(schema_path(path), serde_json::to_vec(&schema)?)?;

    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![frame.index_name().to_string()];
    header.extend(frame.column_names().into_iter().map(str::to_string));
    writer.write_record(&header)?;

    for (row, ts) in frame.index().iter().enumerate() {
        let mut record = Vec::with_capacity(frame.width() + 1);
        record.push(ts.to_string());
        record.extend(frame.columns().iter().map(|c| c.cells[row].render()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    trace!("wrote {} rows to {}", frame.len(), path.display());
    Ok(())
}

/// Read a checkpoint file written by [`write_csv`], typed by its sidecar.
pub fn read_csv(path: &Path) -> EngineResult<MetricFrame> {
    let malformed = |reason: String| EngineError::Frame(format!("{}: {reason}", path.display()));

    let sidecar = schema_path(path);
    let schema: Schema = serde_json::from_slice(&std::fs::read(&sidecar).map_err(|e| {
        malformed(format!("cannot read column schema {}: {e}", sidecar.display()))
    })?)?;

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let names: Vec<&str> = headers.iter().collect();
    let expected: Vec<&str> = std::iter::once(schema.index.as_str())
        .chain(schema.columns.iter().map(|(name, _)| name.as_str()))
        .collect();
    if names != expected {
        return Err(malformed(format!(
            "header {names:?} does not match its schema {expected:?}"
        )));
    }

    let mut index = Vec::new();
    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); schema.columns.len()];

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let line = line + 2;
        let raw_ts = record.get(0).unwrap_or_default();
        let ts = raw_ts
            .parse::<i64>()
            .ok()
            .or_else(|| parse_timestamp_millis(raw_ts))
            .ok_or_else(|| malformed(format!("invalid index '{raw_ts}' on line {line}")))?;
        index.push(ts);
        for (position, cells) in columns.iter_mut().enumerate() {
            let (name, kind) = &schema.columns[position];
            let cell = kind
                .parse(record.get(position + 1).unwrap_or_default())
                .map_err(|reason| malformed(format!("column '{name}' line {line}: {reason}")))?;
            cells.push(cell);
        }
    }

    let mut frame = MetricFrame::with_index(schema.index, index);
    for ((name, _), cells) in schema.columns.into_iter().zip(columns) {
        frame.push_column(name, cells)?;
    }
    Ok(frame)
}

/// Read an arbitrary table; rows get a positional index.
pub fn read_table(path: &Path) -> EngineResult<MetricFrame> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); headers.len()];
    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        for (column, cells) in columns.iter_mut().enumerate() {
            cells.push(Cell::parse(record.get(column).unwrap_or_default()));
        }
        rows += 1;
    }

    let mut frame = MetricFrame::positional(rows);
    for (name, cells) in headers.iter().zip(columns) {
        frame.push_column(name, cells)?;
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TIME_INDEX;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_checkpoint_file_reads_back_equal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("System.csv");

        let mut frame = MetricFrame::with_index(TIME_INDEX, vec![1_000, 2_000, 3_000]);
        frame
            .push_numeric("load_n1", vec![Some(0.1), None, Some(1e-7)])
            .unwrap();
        frame
            .push_column(
                "host",
                vec![
                    Cell::Text("n1".into()),
                    Cell::Null,
                    Cell::Text("n2".into()),
                ],
            )
            .unwrap();

        write_csv(&frame, &path).unwrap();
        let back = read_csv(&path).unwrap();

        assert_eq!(back, frame);
    }

    #[test]
    fn test_numeric_looking_text_stays_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CEP.csv");

        let mut frame = MetricFrame::with_index(TIME_INDEX, vec![1_000, 2_000]);
        frame
            .push_column(
                "ship",
                vec![Cell::Text("42".into()), Cell::Text("NaN".into())],
            )
            .unwrap();
        frame.push_numeric("ms", vec![Some(42.0), None]).unwrap();

        write_csv(&frame, &path).unwrap();
        let back = read_csv(&path).unwrap();

        assert_eq!(back, frame);
        assert!(!back.column("ship").unwrap().is_numeric());
    }

    #[test]
    fn test_missing_schema_is_frame_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("System.csv");
        std::fs::write(&path, "time,load\n1000,0.5\n").unwrap();

        assert!(matches!(read_csv(&path), Err(EngineError::Frame(_))));
    }

    #[test]
    fn test_read_table_is_positional() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.csv");
        std::fs::write(&path, "time,cpu\n1700000000,0.5\n1700000010,\n").unwrap();

        let frame = read_table(&path).unwrap();

        assert_eq!(frame.index(), &[0, 1]);
        assert_eq!(frame.numeric("cpu").unwrap(), vec![Some(0.5), None]);
        assert_eq!(frame.column_names(), vec!["time", "cpu"]);
    }
}
