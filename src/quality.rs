//! Probes for the many ways the exports spell "missing".

use crate::snapshot::{BatchKey, Snapshot, SnapshotStore};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Spellings of "missing" seen in the statement exports.
pub const PLACEHOLDER_TOKENS: &[&str] = &[
    "", " ", "-", "―", "—", "--", "Na", "na", "N/A", "n/a", "None", "none", "NULL", "null", "0",
    "0.0",
];

/// Key used for the count of cells containing an ASCII letter.
pub const ALPHABET_KEY: &str = "alphabet";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceholderCounts {
    pub source: String,
    pub column: String,
    /// Exact-match counts, one entry per [`PLACEHOLDER_TOKENS`] token, in that order.
    pub counts: Vec<(&'static str, usize)>,
    pub alphabet: usize,
}

impl PlaceholderCounts {
    pub fn count(&self, token: &str) -> usize {
        if token == ALPHABET_KEY {
            return self.alphabet;
        }
        self.counts
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Counts placeholder spellings per column. Null cells count as `""`.
pub fn probe_placeholders(snapshot: &Snapshot, source: &str) -> Vec<PlaceholderCounts> {
    snapshot
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let mut counts: Vec<(&'static str, usize)> =
                PLACEHOLDER_TOKENS.iter().map(|t| (*t, 0)).collect();
            let mut alphabet = 0;

            for row in snapshot.rows() {
                let text = row[idx].as_text();
                if let Some(slot) = counts.iter_mut().find(|(t, _)| *t == text) {
                    slot.1 += 1;
                }
                if text.chars().any(|c| c.is_ascii_alphabetic()) {
                    alphabet += 1;
                }
            }

            PlaceholderCounts {
                source: source.to_string(),
                column: column.clone(),
                counts,
                alphabet,
            }
        })
        .collect()
}

/// Tokens that occur at least once, mapped to the distinct columns they occur in.
pub fn suspect_placeholders(counts: &[PlaceholderCounts]) -> IndexMap<&'static str, Vec<String>> {
    let mut suspects: IndexMap<&'static str, Vec<String>> = IndexMap::new();
    let tokens = PLACEHOLDER_TOKENS.iter().copied().chain([ALPHABET_KEY]);

    for token in tokens {
        for entry in counts {
            if entry.count(token) == 0 {
                continue;
            }
            let columns = suspects.entry(token).or_default();
            if !columns.contains(&entry.column) {
                columns.push(entry.column.clone());
            }
        }
    }

    suspects
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ZeroHit {
    pub batch: BatchKey,
    pub column: String,
    pub entity: String,
}

/// Every (batch, column, entity) where a cell reads exactly `"0"`.
pub fn find_zero_cells(store: &SnapshotStore, entity_column: &str) -> Vec<ZeroHit> {
    let mut hits = IndexSet::new();

    for (key, snapshot) in store.iter() {
        let Some(entity_idx) = snapshot.column_index(entity_column) else {
            continue;
        };
        for (col_idx, column) in snapshot.columns().iter().enumerate() {
            for row in snapshot.rows() {
                if row[col_idx].as_text() != "0" {
                    continue;
                }
                hits.insert(ZeroHit {
                    batch: key.clone(),
                    column: column.clone(),
                    entity: row[entity_idx].as_text(),
                });
            }
        }
    }

    hits.into_iter().collect()
}
