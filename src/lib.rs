//! # Filing Reconciler
//!
//! Duplicate detection and latest-filing-wins reconciliation for per-year
//! financial statement exports (balance sheets, income statements, cash flows).
//!
//! ## Core Concepts
//!
//! - **Snapshot**: one exported table, rows keyed by (entity code, fiscal period)
//! - **Batch**: a snapshot tagged with its document kind and period label (the
//!   year it was downloaded), which is independent of the fiscal periods inside it
//! - **Authoritative batch**: the newest batch, trusted to correct restated
//!   figures in every older batch of the same kind
//! - **Digest**: a 128-bit fingerprint of a snapshot's contents, used to spot
//!   batches that were exported twice
//!
//! ## Example
//!
//! ```rust,ignore
//! use filing_reconciler::*;
//!
//! let config = PipelineConfig::from_json_file("setting.json")?;
//! let loaded = load_store(&config)?;
//!
//! let outcome = process_store(&config, &loaded.store)?;
//! for (batch, update) in &outcome.updates {
//!     println!("{}: {} cells restated", batch, update.cells_changed);
//! }
//! ```

pub mod coercion;
pub mod duplicates;
pub mod error;
pub mod hasher;
pub mod ingestion;
pub mod merge;
pub mod quality;
pub mod reconciler;
pub mod report;
pub mod schema;
pub mod snapshot;
pub mod utils;

pub use coercion::{
    assert_schema, convert_columns, convert_columns_named, infer_column_types, ColumnType,
    ColumnTypeInfo, Coerced,
};
pub use duplicates::{ensure_no_duplicates, find_duplicates, DuplicateDetector, DuplicateGroups};
pub use error::{Result, SnapshotError};
pub use hasher::{digest, ContentHasher, Digest};
pub use ingestion::{
    batch_path, load_code_list, load_snapshot, load_store, probe_headers, read_snapshot, HeaderProbe, LoadOptions,
    LoadOutcome,
};
pub use merge::{filter_by_codes, merge_kinds};
pub use quality::{
    find_zero_cells, probe_placeholders, suspect_placeholders, PlaceholderCounts, ZeroHit,
    PLACEHOLDER_TOKENS,
};
pub use reconciler::{reconcile, BatchUpdate, ReconcileOutcome, ReconcileWarning, Reconciler};
pub use schema::*;
pub use snapshot::*;

use log::{debug, info};

pub struct SnapshotProcessor;

impl SnapshotProcessor {
    /// Validates the config, optionally rejects duplicate batches, then reconciles
    /// every kind against the configured authoritative label.
    pub fn process(config: &PipelineConfig, store: &SnapshotStore) -> Result<ReconcileOutcome> {
        config.validate()?;

        info!(
            "Processing {} batches across {} document kinds",
            store.len(),
            store.kinds().len()
        );

        if config.strict_duplicates {
            DuplicateDetector::new(config.digest_options()).ensure_unique(store.iter())?;
            debug!("Strict duplicate check passed");
        }

        let options = config.reconcile_options();
        let outcome = Reconciler::new(&options).reconcile(store, &config.authoritative_label)?;

        info!(
            "Reconciliation changed {} cells with {} warnings",
            outcome.total_cells_changed(),
            outcome.warnings.len()
        );

        Ok(outcome)
    }

    pub fn duplicates(config: &PipelineConfig, store: &SnapshotStore) -> DuplicateGroups<BatchKey> {
        DuplicateDetector::new(config.digest_options()).find_in_store(store)
    }
}

pub fn process_store(config: &PipelineConfig, store: &SnapshotStore) -> Result<ReconcileOutcome> {
    SnapshotProcessor::process(config, store)
}

pub fn find_store_duplicates(
    config: &PipelineConfig,
    store: &SnapshotStore,
) -> DuplicateGroups<BatchKey> {
    SnapshotProcessor::duplicates(config, store)
}
