//! Content fingerprinting for snapshots.
//!
//! Every cell is rendered with [`Cell::as_text`] before hashing, so a null
//! cell and an empty string hash the same. Distinct missing-value spellings
//! (`"N/A"`, `"-"`) are left as they are and hash differently.

use crate::schema::DigestOptions;
use crate::snapshot::{Cell, Snapshot};
use serde::{Deserialize, Serialize};

/// A 128-bit fingerprint of a snapshot's contents (truncated BLAKE3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub [u8; 16]);

impl Digest {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub struct ContentHasher {
    options: DigestOptions,
}

impl ContentHasher {
    pub fn new(options: DigestOptions) -> Self {
        Self { options }
    }

    pub fn digest(&self, snapshot: &Snapshot) -> Digest {
        let column_order = self.column_order(snapshot);
        let mut rows = render_rows(snapshot.rows(), &column_order);

        if self.options.ignore_row_order {
            // Stable, so identical rows keep their original relative order.
            rows.sort();
        }

        let mut hasher = blake3::Hasher::new();

        hasher.update(&(column_order.len() as u64).to_le_bytes());
        for &idx in &column_order {
            write_field(&mut hasher, &snapshot.columns()[idx]);
        }

        hasher.update(&(rows.len() as u64).to_le_bytes());
        for (position, row) in rows.iter().enumerate() {
            hasher.update(&(position as u64).to_le_bytes());
            for field in row {
                write_field(&mut hasher, field);
            }
        }

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
        Digest(bytes)
    }

    fn column_order(&self, snapshot: &Snapshot) -> Vec<usize> {
        let mut order: Vec<usize> = (0..snapshot.columns().len()).collect();
        if self.options.ignore_column_order {
            order.sort_by(|&a, &b| snapshot.columns()[a].cmp(&snapshot.columns()[b]));
        }
        order
    }
}

fn render_rows(rows: &[Vec<Cell>], column_order: &[usize]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| column_order.iter().map(|&idx| row[idx].as_text()).collect())
        .collect()
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn write_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

pub fn digest(snapshot: &Snapshot, options: DigestOptions) -> Digest {
    ContentHasher::new(options).digest(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::from_rows(
            vec!["code".to_string(), "period".to_string(), "assets".to_string()],
            vec![
                vec![Cell::from("1301"), Cell::from("2022-03"), Cell::Int(100)],
                vec![Cell::from("1332"), Cell::from("2022-03"), Cell::Null],
                vec![Cell::from("1301"), Cell::from("2023-03"), Cell::Float(120.5)],
            ],
        )
        .unwrap()
    }

    fn reversed(snapshot: &Snapshot) -> Snapshot {
        let rows = snapshot.rows().iter().rev().cloned().collect();
        Snapshot::from_rows(snapshot.columns().to_vec(), rows).unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let snapshot = sample();
        let options = DigestOptions::new(false, false);
        assert_eq!(digest(&snapshot, options), digest(&snapshot, options));
        assert_eq!(digest(&snapshot, options).to_hex().len(), 32);
    }

    #[test]
    fn test_row_order_sensitivity() {
        let snapshot = sample();
        let flipped = reversed(&snapshot);

        let ordered = DigestOptions::new(false, false);
        assert_ne!(digest(&snapshot, ordered), digest(&flipped, ordered));

        let unordered = DigestOptions::new(true, false);
        assert_eq!(digest(&snapshot, unordered), digest(&flipped, unordered));
    }

    #[test]
    fn test_null_matches_empty_string_but_not_other_spellings() {
        let columns = vec!["code".to_string(), "assets".to_string()];
        let with_null =
            Snapshot::from_rows(columns.clone(), vec![vec![Cell::from("1301"), Cell::Null]]).unwrap();
        let with_empty =
            Snapshot::from_rows(columns.clone(), vec![vec![Cell::from("1301"), Cell::from("")]])
                .unwrap();
        let with_dash =
            Snapshot::from_rows(columns.clone(), vec![vec![Cell::from("1301"), Cell::from("-")]])
                .unwrap();
        let with_na =
            Snapshot::from_rows(columns, vec![vec![Cell::from("1301"), Cell::from("N/A")]]).unwrap();

        let options = DigestOptions::default();
        assert_eq!(digest(&with_null, options), digest(&with_empty, options));
        assert_ne!(digest(&with_dash, options), digest(&with_na, options));
        assert_ne!(digest(&with_null, options), digest(&with_dash, options));
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let left = Snapshot::from_rows(columns.clone(), vec![vec![Cell::from("ab"), Cell::from("c")]])
            .unwrap();
        let right =
            Snapshot::from_rows(columns, vec![vec![Cell::from("a"), Cell::from("bc")]]).unwrap();

        let options = DigestOptions::default();
        assert_ne!(digest(&left, options), digest(&right, options));
    }

    #[test]
    fn test_duplicate_rows_hash_stably_when_sorted() {
        let columns = vec!["code".to_string()];
        let rows = vec![
            vec![Cell::from("b")],
            vec![Cell::from("a")],
            vec![Cell::from("b")],
        ];
        let snapshot = Snapshot::from_rows(columns, rows).unwrap();
        let options = DigestOptions::new(true, false);
        assert_eq!(digest(&snapshot, options), digest(&reversed(&snapshot), options));
    }

    #[test]
    fn test_empty_snapshot_digest_depends_on_header() {
        let a = Snapshot::new(vec!["x".to_string()]);
        let b = Snapshot::new(vec!["y".to_string()]);
        let options = DigestOptions::default();
        assert_ne!(digest(&a, options), digest(&b, options));
        assert_eq!(digest(&a, options), digest(&a.clone(), options));
    }
}
