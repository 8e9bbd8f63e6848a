use crate::error::{Result, SnapshotError};
use crate::snapshot::{Cell, Snapshot};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl FromStr for ColumnType {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(ColumnType::Integer),
            "float" | "double" => Ok(ColumnType::Float),
            "str" | "string" | "text" => Ok(ColumnType::Text),
            _ => Err(SnapshotError::UnsupportedConversion(s.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "str",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub snapshot: Snapshot,
    /// Requested columns that the snapshot does not have.
    pub skipped: Vec<String>,
}

/// Converts the named columns of a copy of `snapshot` to `target`.
///
/// Values that cannot be represented in the target type become null. Converting
/// to text renders null as `"NaN"`.
pub fn convert_columns(snapshot: &Snapshot, columns: &[&str], target: ColumnType) -> Coerced {
    let mut converted = snapshot.clone();
    let mut skipped = Vec::new();

    for &column in columns {
        let Some(idx) = converted.column_index(column) else {
            warn!("Column '{}' does not exist, skipping conversion", column);
            skipped.push(column.to_string());
            continue;
        };

        debug!("Converting column '{}' to {}", column, target);
        for row in converted.rows_mut() {
            row[idx] = convert_cell(&row[idx], target);
        }
    }

    Coerced {
        snapshot: converted,
        skipped,
    }
}

/// Like [`convert_columns`], with the target given by name (`int`, `float` or `str`).
pub fn convert_columns_named(snapshot: &Snapshot, columns: &[&str], target: &str) -> Result<Coerced> {
    let target: ColumnType = target.parse()?;
    Ok(convert_columns(snapshot, columns, target))
}

fn convert_cell(cell: &Cell, target: ColumnType) -> Cell {
    match target {
        ColumnType::Integer => match cell {
            Cell::Int(v) => Cell::Int(*v),
            Cell::Float(v) => float_to_int(*v),
            Cell::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => Cell::Int(v),
                    Err(_) => s.parse::<f64>().map(float_to_int).unwrap_or(Cell::Null),
                }
            }
            Cell::Null => Cell::Null,
        },
        ColumnType::Float => match cell {
            Cell::Int(v) => Cell::Float(*v as f64),
            Cell::Float(v) => Cell::Float(*v),
            Cell::Text(s) => s.trim().parse::<f64>().map(Cell::Float).unwrap_or(Cell::Null),
            Cell::Null => Cell::Null,
        },
        ColumnType::Text => match cell {
            Cell::Null => Cell::Text("NaN".to_string()),
            other => Cell::Text(other.as_text()),
        },
    }
}

fn float_to_int(value: f64) -> Cell {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Cell::Int(value as i64)
    } else {
        Cell::Null
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnTypeInfo {
    pub column: String,
    /// `None` when the column holds no non-null value.
    pub dtype: Option<ColumnType>,
    /// Distinct cell kinds in order of first appearance.
    pub observed: Vec<&'static str>,
}

/// Per-column dtype introspection. With `drop_nulls`, null cells are left out of `observed`.
pub fn infer_column_types(snapshot: &Snapshot, drop_nulls: bool) -> Vec<ColumnTypeInfo> {
    snapshot
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let mut observed: Vec<&'static str> = Vec::new();
            let mut dtype: Option<ColumnType> = None;

            for row in snapshot.rows() {
                let cell = &row[idx];
                if !(drop_nulls && cell.is_null()) && !observed.contains(&cell.kind_name()) {
                    observed.push(cell.kind_name());
                }
                dtype = widen(dtype, cell);
            }

            ColumnTypeInfo {
                column: column.clone(),
                dtype,
                observed,
            }
        })
        .collect()
}

fn widen(current: Option<ColumnType>, cell: &Cell) -> Option<ColumnType> {
    let next = match cell {
        Cell::Null => return current,
        Cell::Int(_) => ColumnType::Integer,
        Cell::Float(_) => ColumnType::Float,
        Cell::Text(_) => ColumnType::Text,
    };
    match (current, next) {
        (None, t) => Some(t),
        (Some(ColumnType::Text), _) | (_, ColumnType::Text) => Some(ColumnType::Text),
        (Some(ColumnType::Float), _) | (_, ColumnType::Float) => Some(ColumnType::Float),
        _ => Some(ColumnType::Integer),
    }
}

/// Fails on the first expected column that is absent or whose inferred dtype differs.
/// An all-null column satisfies any expected type.
pub fn assert_schema(snapshot: &Snapshot, expected: &[(&str, ColumnType)]) -> Result<()> {
    let inferred = infer_column_types(snapshot, true);

    for &(column, expected_type) in expected {
        let Some(info) = inferred.iter().find(|i| i.column == column) else {
            return Err(SnapshotError::SchemaMismatch {
                column: column.to_string(),
                expected: expected_type.to_string(),
                found: "missing".to_string(),
            });
        };

        if let Some(found) = info.dtype {
            if found != expected_type {
                return Err(SnapshotError::SchemaMismatch {
                    column: column.to_string(),
                    expected: expected_type.to_string(),
                    found: found.to_string(),
                });
            }
        }
    }

    Ok(())
}
