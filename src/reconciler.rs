use crate::error::{Result, SnapshotError};
use crate::schema::{CutoffMode, KeyPolicy, NullPolicy, ReconcileOptions};
use crate::snapshot::{BatchKey, Cell, PeriodLabel, Snapshot, SnapshotStore};
use crate::utils::{month_start, parse_fiscal_period};
use chrono::NaiveDate;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Non-fatal conditions collected during a reconcile pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ReconcileWarning {
    /// The kind has no batch under the authoritative label and was skipped.
    MissingAuthoritativeBatch { kind: String, label: PeriodLabel },
    EmptySnapshot { batch: BatchKey },
    /// An authoritative row whose fiscal period could not be read. It is never used as source.
    UnparseablePeriod {
        batch: BatchKey,
        row: usize,
        value: String,
    },
    DuplicateSourceKey {
        batch: BatchKey,
        entity: String,
        period: String,
    },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileWarning::MissingAuthoritativeBatch { kind, label } => {
                write!(f, "no authoritative batch {} for kind '{}', kind skipped", label, kind)
            }
            ReconcileWarning::EmptySnapshot { batch } => {
                write!(f, "snapshot {} is empty", batch)
            }
            ReconcileWarning::UnparseablePeriod { batch, row, value } => {
                write!(f, "row {} of {} has unreadable fiscal period '{}'", row, batch, value)
            }
            ReconcileWarning::DuplicateSourceKey {
                batch,
                entity,
                period,
            } => write!(
                f,
                "natural key ({}, {}) repeats in {}, last row wins",
                entity, period, batch
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchUpdate {
    pub rows_matched: usize,
    pub cells_changed: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub store: SnapshotStore,
    pub warnings: Vec<ReconcileWarning>,
    /// One entry per target batch that was compared against a source.
    pub updates: IndexMap<BatchKey, BatchUpdate>,
}

impl ReconcileOutcome {
    pub fn total_cells_changed(&self) -> usize {
        self.updates.values().map(|u| u.cells_changed).sum()
    }
}

type RowKey = (String, NaiveDate);

struct SourceRows {
    columns: Vec<String>,
    rows: HashMap<RowKey, Vec<Cell>>,
}

pub struct Reconciler<'a> {
    options: &'a ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(options: &'a ReconcileOptions) -> Self {
        Self { options }
    }

    /// Copies restated figures from the authoritative batch into every other
    /// batch of the same kind. The input store is left untouched.
    pub fn reconcile(
        &self,
        store: &SnapshotStore,
        authoritative: &PeriodLabel,
    ) -> Result<ReconcileOutcome> {
        let cutoff = authoritative.cutoff()?;
        info!(
            "Reconciling {} batches against authoritative label {} (cutoff {}, {:?})",
            store.len(),
            authoritative,
            cutoff,
            self.options.cutoff_mode
        );

        let mut output = store.clone();
        let mut warnings = Vec::new();
        let mut updates = IndexMap::new();

        for kind in store.kinds() {
            let auth_key = BatchKey::new(kind, authoritative.clone());
            let Some(auth) = store.get_batch(&auth_key) else {
                warnings.push(ReconcileWarning::MissingAuthoritativeBatch {
                    kind: kind.to_string(),
                    label: authoritative.clone(),
                });
                continue;
            };

            let source = self.collect_source_rows(&auth_key, auth, cutoff, &mut warnings)?;
            debug!(
                "{}: {} of {} rows eligible as source",
                auth_key,
                source.rows.len(),
                auth.len()
            );

            for label in store.labels_for(kind) {
                if label == authoritative {
                    continue;
                }
                let target_key = BatchKey::new(kind, label.clone());
                let Some(target) = output.get_batch_mut(&target_key) else {
                    continue;
                };
                if target.is_empty() {
                    warnings.push(ReconcileWarning::EmptySnapshot { batch: target_key });
                    continue;
                }

                let update = self.apply(&target_key, &source, target)?;
                debug!(
                    "{}: {} rows matched, {} cells changed",
                    target_key, update.rows_matched, update.cells_changed
                );
                updates.insert(target_key, update);
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }

        Ok(ReconcileOutcome {
            store: output,
            warnings,
            updates,
        })
    }

    fn collect_source_rows(
        &self,
        key: &BatchKey,
        snapshot: &Snapshot,
        cutoff: NaiveDate,
        warnings: &mut Vec<ReconcileWarning>,
    ) -> Result<SourceRows> {
        let mut source = SourceRows {
            columns: snapshot.columns().to_vec(),
            rows: HashMap::new(),
        };

        if snapshot.is_empty() {
            warnings.push(ReconcileWarning::EmptySnapshot { batch: key.clone() });
            return Ok(source);
        }

        let (entity_idx, period_idx) = self.key_indices(key, snapshot)?;

        for (row_idx, row) in snapshot.rows().iter().enumerate() {
            let Some(period) = parse_fiscal_period(&row[period_idx]) else {
                warnings.push(ReconcileWarning::UnparseablePeriod {
                    batch: key.clone(),
                    row: row_idx,
                    value: row[period_idx].as_text(),
                });
                continue;
            };

            // Cutoff is compared per month; the key keeps the full date.
            let eligible = match self.options.cutoff_mode {
                CutoffMode::Strict => month_start(period) < cutoff,
                CutoffMode::Inclusive => month_start(period) <= cutoff,
            };
            if !eligible {
                continue;
            }

            let entity = row[entity_idx].as_text();
            if entity.is_empty() {
                continue;
            }

            let period_text = row[period_idx].as_text();
            if source.rows.insert((entity.clone(), period), row.clone()).is_some() {
                match self.options.key_policy {
                    KeyPolicy::Reject => {
                        return Err(SnapshotError::DuplicateNaturalKey {
                            batch: key.to_string(),
                            entity,
                            period: period_text,
                        });
                    }
                    KeyPolicy::LastWriteWins => {
                        warnings.push(ReconcileWarning::DuplicateSourceKey {
                            batch: key.clone(),
                            entity,
                            period: period_text,
                        });
                    }
                }
            }
        }

        Ok(source)
    }

    fn apply(
        &self,
        key: &BatchKey,
        source: &SourceRows,
        target: &mut Snapshot,
    ) -> Result<BatchUpdate> {
        let mut update = BatchUpdate::default();
        if source.rows.is_empty() {
            return Ok(update);
        }

        let (entity_idx, period_idx) = self.key_indices(key, target)?;

        // Only columns both sides share are copied; the target schema never widens.
        let shared: Vec<(usize, usize)> = target
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| !self.options.natural_key.is_key_column(name))
            .filter_map(|(t_idx, name)| {
                source
                    .columns
                    .iter()
                    .position(|c| c == name)
                    .map(|s_idx| (t_idx, s_idx))
            })
            .collect();

        for row in target.rows_mut() {
            let Some(period) = parse_fiscal_period(&row[period_idx]) else {
                continue;
            };
            let row_key = (row[entity_idx].as_text(), period);
            let Some(source_row) = source.rows.get(&row_key) else {
                continue;
            };

            update.rows_matched += 1;
            for &(t_idx, s_idx) in &shared {
                let value = &source_row[s_idx];
                if value.is_null() && self.options.null_policy == NullPolicy::KeepTarget {
                    continue;
                }
                if row[t_idx] != *value {
                    row[t_idx] = value.clone();
                    update.cells_changed += 1;
                }
            }
        }

        Ok(update)
    }

    fn key_indices(&self, key: &BatchKey, snapshot: &Snapshot) -> Result<(usize, usize)> {
        let natural_key = &self.options.natural_key;
        let lookup = |column: &str| {
            snapshot
                .column_index(column)
                .ok_or_else(|| SnapshotError::MissingColumn {
                    batch: key.to_string(),
                    column: column.to_string(),
                })
        };
        Ok((
            lookup(&natural_key.entity_column)?,
            lookup(&natural_key.period_column)?,
        ))
    }
}

pub fn reconcile(
    store: &SnapshotStore,
    authoritative: &PeriodLabel,
    options: &ReconcileOptions,
) -> Result<ReconcileOutcome> {
    Reconciler::new(options).reconcile(store, authoritative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::NaturalKey;

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            natural_key: NaturalKey::new("code", "period"),
            ..ReconcileOptions::default()
        }
    }

    fn bs(rows: &[(&str, &str, Option<i64>)]) -> Snapshot {
        Snapshot::from_rows(
            vec!["code".to_string(), "period".to_string(), "assets".to_string()],
            rows.iter()
                .map(|(code, period, assets)| {
                    vec![Cell::from(*code), Cell::from(*period), Cell::from(*assets)]
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_overwrites_only_older_periods() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2024", bs(&[("1301", "2022-03", Some(90)), ("1301", "2024-03", Some(1))]));
        store.insert("bs", "2025", bs(&[("1301", "2022-03", Some(100)), ("1301", "2024-03", Some(2))]));

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        let target = outcome.store.get("bs", &PeriodLabel::from("2024")).unwrap();

        assert_eq!(target.get(0, "assets"), Some(&Cell::Int(100)));
        // 2024-03 is before the 2025 cutoff, so it is restated too.
        assert_eq!(target.get(1, "assets"), Some(&Cell::Int(2)));
        assert_eq!(
            outcome.updates[&BatchKey::new("bs", "2024")],
            BatchUpdate {
                rows_matched: 2,
                cells_changed: 2
            }
        );
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_strict_cutoff_excludes_cutoff_day() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2024", bs(&[("1301", "2025-01-01", Some(1))]));
        store.insert("bs", "2025", bs(&[("1301", "2025-01-01", Some(2))]));

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        let target = outcome.store.get("bs", &PeriodLabel::from("2024")).unwrap();
        assert_eq!(target.get(0, "assets"), Some(&Cell::Int(1)));
    }

    #[test]
    fn test_inclusive_cutoff_includes_cutoff_day() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2024", bs(&[("1301", "2025-01", Some(1))]));
        store.insert("bs", "2025", bs(&[("1301", "2025-01", Some(2))]));

        let inclusive = ReconcileOptions {
            cutoff_mode: CutoffMode::Inclusive,
            ..options()
        };
        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &inclusive).unwrap();
        let target = outcome.store.get("bs", &PeriodLabel::from("2024")).unwrap();
        assert_eq!(target.get(0, "assets"), Some(&Cell::Int(2)));
    }

    #[test]
    fn test_never_inserts_new_keys() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "2022-03", Some(90))]));
        store.insert("bs", "2025", bs(&[("1301", "2022-03", Some(100)), ("9999", "2022-03", Some(5))]));

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        let target = outcome.store.get("bs", &PeriodLabel::from("2023")).unwrap();
        assert_eq!(target.len(), 1);
        assert_eq!(target.get(0, "code"), Some(&Cell::from("1301")));
    }

    #[test]
    fn test_matches_across_period_spellings() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "2022/03", Some(90))]));
        store.insert("bs", "2025", bs(&[("1301", "2022-03", Some(100))]));

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        let target = outcome.store.get("bs", &PeriodLabel::from("2023")).unwrap();
        assert_eq!(target.get(0, "assets"), Some(&Cell::Int(100)));
        assert_eq!(target.get(0, "period"), Some(&Cell::from("2022/03")));
    }

    #[test]
    fn test_day_precise_periods_in_one_month_stay_distinct() {
        let rows = [("1301", "2022-03-15", Some(1)), ("1301", "2022-03-31", Some(2))];
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&rows));
        store.insert(
            "bs",
            "2025",
            bs(&[("1301", "2022-03-15", Some(10)), ("1301", "2022-03-31", Some(20))]),
        );

        let reject = ReconcileOptions {
            key_policy: KeyPolicy::Reject,
            ..options()
        };
        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &reject).unwrap();
        let target = outcome.store.get("bs", &PeriodLabel::from("2023")).unwrap();
        assert_eq!(target.get(0, "assets"), Some(&Cell::Int(10)));
        assert_eq!(target.get(1, "assets"), Some(&Cell::Int(20)));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_schema_is_not_widened() {
        let target = Snapshot::from_rows(
            vec!["code".to_string(), "period".to_string(), "assets".to_string(), "note".to_string()],
            vec![vec![Cell::from("1301"), Cell::from("2022-03"), Cell::Int(90), Cell::from("old")]],
        )
        .unwrap();
        let source = Snapshot::from_rows(
            vec!["period".to_string(), "code".to_string(), "assets".to_string(), "extra".to_string()],
            vec![vec![Cell::from("2022-03"), Cell::from("1301"), Cell::Int(100), Cell::Int(7)]],
        )
        .unwrap();

        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", target);
        store.insert("bs", "2025", source);

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        let updated = outcome.store.get("bs", &PeriodLabel::from("2023")).unwrap();
        assert_eq!(updated.columns(), &["code", "period", "assets", "note"]);
        assert_eq!(updated.get(0, "assets"), Some(&Cell::Int(100)));
        assert_eq!(updated.get(0, "note"), Some(&Cell::from("old")));
    }

    #[test]
    fn test_null_policy() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "2022-03", Some(90))]));
        store.insert("bs", "2025", bs(&[("1301", "2022-03", None)]));

        let overwrite = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        assert_eq!(
            overwrite.store.get("bs", &PeriodLabel::from("2023")).unwrap().get(0, "assets"),
            Some(&Cell::Null)
        );

        let keep = ReconcileOptions {
            null_policy: NullPolicy::KeepTarget,
            ..options()
        };
        let kept = reconcile(&store, &PeriodLabel::from("2025"), &keep).unwrap();
        assert_eq!(
            kept.store.get("bs", &PeriodLabel::from("2023")).unwrap().get(0, "assets"),
            Some(&Cell::Int(90))
        );
    }

    #[test]
    fn test_duplicate_source_keys() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "2022-03", Some(90))]));
        store.insert("bs", "2025", bs(&[("1301", "2022-03", Some(100)), ("1301", "2022-03", Some(110))]));

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        assert_eq!(
            outcome.store.get("bs", &PeriodLabel::from("2023")).unwrap().get(0, "assets"),
            Some(&Cell::Int(110))
        );
        assert!(matches!(
            outcome.warnings.as_slice(),
            [ReconcileWarning::DuplicateSourceKey { .. }]
        ));

        let reject = ReconcileOptions {
            key_policy: KeyPolicy::Reject,
            ..options()
        };
        assert!(matches!(
            reconcile(&store, &PeriodLabel::from("2025"), &reject),
            Err(SnapshotError::DuplicateNaturalKey { .. })
        ));
    }

    #[test]
    fn test_unparseable_periods_are_reported() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "-", Some(90))]));
        store.insert("bs", "2025", bs(&[("1301", "-", Some(100))]));

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        assert_eq!(
            outcome.store.get("bs", &PeriodLabel::from("2023")).unwrap().get(0, "assets"),
            Some(&Cell::Int(90))
        );
        assert_eq!(
            outcome.warnings,
            vec![ReconcileWarning::UnparseablePeriod {
                batch: BatchKey::new("bs", "2025"),
                row: 0,
                value: "-".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_snapshots_are_not_errors() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", Snapshot::default());
        store.insert("bs", "2024", bs(&[("1301", "2022-03", Some(90))]));
        store.insert("bs", "2025", Snapshot::default());

        let outcome = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        assert_eq!(outcome.store, store);
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome
            .warnings
            .iter()
            .all(|w| matches!(w, ReconcileWarning::EmptySnapshot { .. })));
    }

    #[test]
    fn test_missing_key_column_is_fatal() {
        let broken = Snapshot::from_rows(
            vec!["code".to_string(), "assets".to_string()],
            vec![vec![Cell::from("1301"), Cell::Int(1)]],
        )
        .unwrap();
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "2022-03", Some(90))]));
        store.insert("bs", "2025", broken);

        match reconcile(&store, &PeriodLabel::from("2025"), &options()) {
            Err(SnapshotError::MissingColumn { batch, column }) => {
                assert_eq!(batch, "bs@2025");
                assert_eq!(column, "period");
            }
            other => panic!("expected MissingColumn, got {:?}", other.map(|o| o.warnings)),
        }
    }

    #[test]
    fn test_invalid_authoritative_label() {
        let store = SnapshotStore::new();
        assert!(matches!(
            reconcile(&store, &PeriodLabel::from("latest"), &options()),
            Err(SnapshotError::InvalidPeriodLabel(_))
        ));
    }

    #[test]
    fn test_input_store_is_not_mutated() {
        let mut store = SnapshotStore::new();
        store.insert("bs", "2023", bs(&[("1301", "2022-03", Some(90))]));
        store.insert("bs", "2025", bs(&[("1301", "2022-03", Some(100))]));
        let before = store.clone();

        let _ = reconcile(&store, &PeriodLabel::from("2025"), &options()).unwrap();
        assert_eq!(store, before);
    }
}
