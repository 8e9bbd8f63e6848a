use crate::error::{Result, SnapshotError};
use crate::utils::label_cutoff;
use chrono::NaiveDate;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column name the source exports use for the company code.
pub const DEFAULT_ENTITY_COLUMN: &str = "コード";
/// Column name the source exports use for the fiscal period.
pub const DEFAULT_PERIOD_COLUMN: &str = "年度";

/// A single value in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Infers a typed cell from raw text: integer, then float, otherwise text.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Cell::Null;
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Cell::Int(value);
        }
        if let Ok(value) = raw.parse::<f64>() {
            return Cell::Float(value);
        }
        Cell::Text(raw.to_string())
    }

    /// String rendering shared by hashing and placeholder probing.
    /// Null renders as the empty string, so null and `""` are indistinguishable here.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Int(value) => value.to_string(),
            Cell::Float(value) => value.to_string(),
            Cell::Text(value) => value.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Int(_) => "int",
            Cell::Float(_) => "float",
            Cell::Text(_) => "str",
        }
    }
}

// NaN equals NaN so a reconciled snapshot compares equal to itself.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => true,
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Float(a), Cell::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Cell::Text(a), Cell::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// A table of rows sharing one header. Every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawSnapshot")]
pub struct Snapshot {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Deserialize)]
struct RawSnapshot {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl TryFrom<RawSnapshot> for Snapshot {
    type Error = SnapshotError;

    fn try_from(raw: RawSnapshot) -> Result<Self> {
        Snapshot::from_rows(raw.columns, raw.rows)
    }
}

impl Snapshot {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut snapshot = Self::new(columns);
        for row in rows {
            snapshot.push_row(row)?;
        }
        Ok(snapshot)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(SnapshotError::RaggedRow {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Replaces one cell. Returns false when the row or column does not exist.
    pub fn set(&mut self, row: usize, column: &str, value: Cell) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        match self.rows.get_mut(row) {
            Some(r) => {
                r[idx] = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Cell>] {
        &mut self.rows
    }

    pub(crate) fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Cell]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }
}

/// The ingestion grouping of a batch, usually the year a file was downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PeriodLabel(pub String);

impl PeriodLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// January 1st of the label's leading year.
    pub fn cutoff(&self) -> Result<NaiveDate> {
        label_cutoff(&self.0)
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeriodLabel {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeriodLabel {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i32> for PeriodLabel {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

/// Identifies one batch: a document kind as filed under one period label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey {
    pub kind: String,
    pub label: PeriodLabel,
}

impl BatchKey {
    pub fn new(kind: impl Into<String>, label: impl Into<PeriodLabel>) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.label)
    }
}

/// The columns that identify a logical row across batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NaturalKey {
    #[schemars(description = "Column holding the company / security code")]
    pub entity_column: String,

    #[schemars(description = "Column holding the fiscal period the row describes")]
    pub period_column: String,
}

impl NaturalKey {
    pub fn new(entity_column: impl Into<String>, period_column: impl Into<String>) -> Self {
        Self {
            entity_column: entity_column.into(),
            period_column: period_column.into(),
        }
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        column == self.entity_column || column == self.period_column
    }
}

impl Default for NaturalKey {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY_COLUMN, DEFAULT_PERIOD_COLUMN)
    }
}

/// Batches keyed by (document kind, period label), iterated in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotStore {
    batches: IndexMap<BatchKey, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        label: impl Into<PeriodLabel>,
        snapshot: Snapshot,
    ) -> Option<Snapshot> {
        self.batches.insert(BatchKey::new(kind, label), snapshot)
    }

    pub fn insert_batch(&mut self, key: BatchKey, snapshot: Snapshot) -> Option<Snapshot> {
        self.batches.insert(key, snapshot)
    }

    pub fn get(&self, kind: &str, label: &PeriodLabel) -> Option<&Snapshot> {
        self.batches.get(&BatchKey {
            kind: kind.to_string(),
            label: label.clone(),
        })
    }

    pub fn get_batch(&self, key: &BatchKey) -> Option<&Snapshot> {
        self.batches.get(key)
    }

    pub(crate) fn get_batch_mut(&mut self, key: &BatchKey) -> Option<&mut Snapshot> {
        self.batches.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BatchKey, &Snapshot)> {
        self.batches.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BatchKey> {
        self.batches.keys()
    }

    /// Document kinds in first-seen order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = Vec::new();
        for key in self.batches.keys() {
            if !kinds.contains(&key.kind.as_str()) {
                kinds.push(key.kind.as_str());
            }
        }
        kinds
    }

    /// Labels present for one kind, in insertion order.
    pub fn labels_for(&self, kind: &str) -> Vec<&PeriodLabel> {
        self.batches
            .keys()
            .filter(|key| key.kind == kind)
            .map(|key| &key.label)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl FromIterator<(BatchKey, Snapshot)> for SnapshotStore {
    fn from_iter<I: IntoIterator<Item = (BatchKey, Snapshot)>>(iter: I) -> Self {
        Self {
            batches: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SnapshotStore {
    type Item = (BatchKey, Snapshot);
    type IntoIter = indexmap::map::IntoIter<BatchKey, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.into_iter()
    }
}
