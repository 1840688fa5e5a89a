//! Time indexed metric tables
//!
//! A [`MetricFrame`] is an ordered set of named columns sharing one `i64`
//! index (epoch milliseconds for acquired data, row positions for raw local
//! tables). Cells are numeric, textual or missing. Frames are handed between
//! components by value; nothing keeps a reference to a frame it returned.

pub mod csv_io;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::util::{epoch_to_millis, parse_timestamp_millis};

/// Default name of the timestamp index
pub const TIME_INDEX: &str = "time";

/// Index name of tables that have not been assigned a timestamp index yet
pub const ROW_INDEX: &str = "row";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Num(f64),
    Text(String),
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Num(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Textual form used for CSV fields and category labels.
    pub fn render(&self) -> String {
        match self {
            Cell::Num(value) => value.to_string(),
            Cell::Text(text) => text.clone(),
            Cell::Null => String::new(),
        }
    }

    /// Type an untyped field: empty is missing, anything `f64` accepts is a
    /// number. Only for foreign tables; checkpoint files carry a schema.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            Cell::Null
        } else if let Ok(value) = raw.parse::<f64>() {
            Cell::Num(value)
        } else {
            Cell::Text(raw.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Num(value)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Null, Cell::Num)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn is_numeric(&self) -> bool {
        self.cells.iter().all(|c| !matches!(c, Cell::Text(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFrame {
    index_name: String,
    index: Vec<i64>,
    columns: Vec<Column>,
}

impl MetricFrame {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self::with_index(index_name, Vec::new())
    }

    pub fn with_index(index_name: impl Into<String>, index: Vec<i64>) -> Self {
        Self {
            index_name: index_name.into(),
            index,
            columns: Vec::new(),
        }
    }

    /// Frame indexed by row position, for tables without a timestamp index.
    pub fn positional(rows: usize) -> Self {
        Self::with_index(ROW_INDEX, (0..rows as i64).collect())
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn push_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) -> EngineResult<()> {
        let name = name.into();
        if cells.len() != self.index.len() {
            return Err(EngineError::Frame(format!(
                "column '{name}' has {} cells but the frame has {} rows",
                cells.len(),
                self.index.len()
            )));
        }
        if self.has_column(&name) {
            return Err(EngineError::Frame(format!("duplicate column '{name}'")));
        }
        self.columns.push(Column { name, cells });
        Ok(())
    }

    pub fn push_numeric(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = Option<f64>>,
    ) -> EngineResult<()> {
        self.push_column(name, values.into_iter().map(Cell::from).collect())
    }

    /// Numeric view of a column; text cells read as missing.
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|c| c.cells.iter().map(Cell::as_f64).collect())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let position = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(position))
    }

    pub fn retain_columns(&mut self, mut keep: impl FnMut(&Column) -> bool) {
        self.columns.retain(|c| keep(c));
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        let mut flags = mask.iter();
        self.index.retain(|_| *flags.next().unwrap_or(&false));
        for column in &mut self.columns {
            let mut flags = mask.iter();
            column.cells.retain(|_| *flags.next().unwrap_or(&false));
        }
    }

    pub fn rename_columns(&mut self, rename: impl Fn(&str) -> String) {
        for column in &mut self.columns {
            column.name = rename(&column.name);
        }
    }

    /// Rows whose index value already appeared on an earlier row.
    pub fn duplicate_index_count(&self) -> usize {
        self.len() - self.index.iter().collect::<BTreeSet<_>>().len()
    }

    /// Outer join on the index. Rows are the sorted union of both indexes,
    /// columns keep their order with `self`'s columns first.
    ///
    /// A side with repeated index values contributes the first row of each
    /// value; the rest are reported and left out.
    pub fn outer_join(&self, other: &MetricFrame) -> EngineResult<MetricFrame> {
        if let Some(clash) = other.columns.iter().find(|c| self.has_column(&c.name)) {
            return Err(EngineError::Frame(format!(
                "cannot join frames sharing column '{}'",
                clash.name
            )));
        }

        let index: Vec<i64> = self
            .index
            .iter()
            .chain(other.index.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut joined = MetricFrame::with_index(self.index_name.clone(), index);
        for source in [self, other] {
            let duplicates = source.duplicate_index_count();
            if duplicates > 0 {
                warn!(
                    "{duplicates} rows of {:?} repeat an index value and are left out of the join",
                    source.column_names()
                );
            }
            let positions: HashMap<i64, usize> = source
                .index
                .iter()
                .enumerate()
                .rev()
                .map(|(row, ts)| (*ts, row))
                .collect();
            for column in &source.columns {
                let cells = joined
                    .index
                    .iter()
                    .map(|ts| {
                        positions
                            .get(ts)
                            .map_or(Cell::Null, |row| column.cells[*row].clone())
                    })
                    .collect();
                joined.columns.push(Column {
                    name: column.name.clone(),
                    cells,
                });
            }
        }

        Ok(joined)
    }

    /// Promote `name` to the index and order rows by it.
    ///
    /// Numeric cells are epochs (seconds or milliseconds), text cells
    /// RFC 3339 timestamps.
    pub fn set_index(&mut self, name: &str) -> EngineResult<()> {
        let column = self
            .column(name)
            .ok_or_else(|| EngineError::Config(format!("index column '{name}' not found")))?;

        let index = column
            .cells
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                match cell {
                    Cell::Num(value) => Some(epoch_to_millis(*value)),
                    Cell::Text(text) => parse_timestamp_millis(text),
                    Cell::Null => None,
                }
                .ok_or_else(|| {
                    EngineError::Frame(format!("row {row} of '{name}' is not a timestamp"))
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        self.remove_column(name);
        self.index = index;
        self.index_name = name.to_string();
        self.sort_by_index();
        Ok(())
    }

    pub fn sort_by_index(&mut self) {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by_key(|row| self.index[*row]);
        if order.iter().enumerate().all(|(i, row)| i == *row) {
            return;
        }
        self.index = order.iter().map(|row| self.index[*row]).collect();
        for column in &mut self.columns {
            column.cells = order.iter().map(|row| column.cells[*row].clone()).collect();
        }
    }

    /// Row-wise view of all numeric columns, `None` for missing cells.
    pub fn numeric_rows(&self) -> (Vec<String>, Vec<Vec<Option<f64>>>) {
        let numeric: Vec<&Column> = self.columns.iter().filter(|c| c.is_numeric()).collect();
        let names = numeric.iter().map(|c| c.name.clone()).collect();
        let rows = (0..self.len())
            .map(|row| numeric.iter().map(|c| c.cells[row].as_f64()).collect())
            .collect();
        (names, rows)
    }
}
