use crate::error::{Result, SnapshotError};
use crate::snapshot::{BatchKey, Cell, NaturalKey, PeriodLabel, Snapshot, SnapshotStore};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashSet;

/// Outer-joins every kind's batch for `label` on the natural key.
///
/// The two key columns come first, followed by each kind's remaining columns in
/// kind order. A column name already taken is prefixed as `<kind>:<column>`.
/// A key repeated within one kind keeps the values of its last row.
pub fn merge_kinds(store: &SnapshotStore, label: &PeriodLabel, key: &NaturalKey) -> Result<Snapshot> {
    let mut columns = vec![key.entity_column.clone(), key.period_column.clone()];
    let mut plans: Vec<(&Snapshot, usize, usize, Vec<(usize, usize)>)> = Vec::new();

    for kind in store.kinds() {
        let batch = BatchKey::new(kind, label.clone());
        let Some(snapshot) = store.get_batch(&batch) else {
            continue;
        };
        if snapshot.is_empty() {
            continue;
        }

        let entity_idx = require_column(&batch, snapshot, &key.entity_column)?;
        let period_idx = require_column(&batch, snapshot, &key.period_column)?;

        let mut placements = Vec::new();
        for (src_idx, name) in snapshot.columns().iter().enumerate() {
            if key.is_key_column(name) {
                continue;
            }
            let out_name = if columns.contains(name) {
                format!("{}:{}", kind, name)
            } else {
                name.clone()
            };
            placements.push((src_idx, columns.len()));
            columns.push(out_name);
        }

        plans.push((snapshot, entity_idx, period_idx, placements));
    }

    let width = columns.len();
    let mut rows: IndexMap<(String, String), Vec<Cell>> = IndexMap::new();

    for (snapshot, entity_idx, period_idx, placements) in &plans {
        for row in snapshot.rows() {
            let natural = (row[*entity_idx].as_text(), row[*period_idx].as_text());
            let merged = rows.entry(natural).or_insert_with(|| {
                let mut fresh = vec![Cell::Null; width];
                fresh[0] = row[*entity_idx].clone();
                fresh[1] = row[*period_idx].clone();
                fresh
            });
            for &(src_idx, out_idx) in placements {
                merged[out_idx] = row[src_idx].clone();
            }
        }
    }

    debug!(
        "Merged {} kinds for label {} into {} rows x {} columns",
        plans.len(),
        label,
        rows.len(),
        width
    );

    Snapshot::from_rows(columns, rows.into_values().collect())
}

/// Keeps only rows whose entity code is in `codes`.
pub fn filter_by_codes(snapshot: &Snapshot, entity_column: &str, codes: &[&str]) -> Result<Snapshot> {
    let Some(entity_idx) = snapshot.column_index(entity_column) else {
        return Err(SnapshotError::MissingColumn {
            batch: "<snapshot>".to_string(),
            column: entity_column.to_string(),
        });
    };

    let wanted: HashSet<&str> = codes.iter().copied().collect();
    let mut filtered = snapshot.clone();
    filtered.retain_rows(|row| wanted.contains(row[entity_idx].as_text().as_str()));
    Ok(filtered)
}

fn require_column(batch: &BatchKey, snapshot: &Snapshot, column: &str) -> Result<usize> {
    snapshot
        .column_index(column)
        .ok_or_else(|| SnapshotError::MissingColumn {
            batch: batch.to_string(),
            column: column.to_string(),
        })
}
