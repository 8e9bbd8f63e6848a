use crate::error::{Result, SnapshotError};
use crate::schema::PipelineConfig;
use crate::snapshot::{BatchKey, Cell, PeriodLabel, Snapshot, SnapshotStore};
use csv::{ReaderBuilder, StringRecord};
use log::{debug, info};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Trimmed cell texts read as null. The empty string is always null.
    pub null_tokens: Vec<String>,
    /// Kept as text so codes with leading zeros survive.
    pub entity_column: String,
}

impl LoadOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            null_tokens: config.null_tokens.clone(),
            entity_column: config.natural_key.entity_column.clone(),
        }
    }

    fn parse_cell(&self, raw: &str, is_entity: bool) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.null_tokens.iter().any(|t| t == trimmed) {
            return Cell::Null;
        }
        if is_entity {
            return Cell::Text(trimmed.to_string());
        }
        Cell::infer(trimmed)
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub store: SnapshotStore,
    /// Configured (label, kind) files that did not exist.
    pub missing: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderProbe {
    pub kind: String,
    pub label: PeriodLabel,
    pub columns: Vec<String>,
}

/// `base_path/<label>/<kind>`
pub fn batch_path(base_path: &Path, label: &PeriodLabel, kind: &str) -> PathBuf {
    base_path.join(label.as_str()).join(kind)
}

/// Loads every configured (kind, label) file that exists, kinds outermost.
pub fn load_store(config: &PipelineConfig) -> Result<LoadOutcome> {
    let options = LoadOptions::from_config(config);
    let mut store = SnapshotStore::new();
    let mut missing = Vec::new();

    for kind in &config.document_kinds {
        for label in &config.period_labels {
            let path = batch_path(&config.data_path, label, kind);
            if !path.exists() {
                debug!("Skipping missing file {}", path.display());
                missing.push(path);
                continue;
            }

            let snapshot = load_snapshot(&path, &options)?;
            debug!(
                "Loaded {} rows x {} columns from {}",
                snapshot.len(),
                snapshot.columns().len(),
                path.display()
            );
            store.insert_batch(BatchKey::new(kind.as_str(), label.clone()), snapshot);
        }
    }

    info!(
        "Loaded {} batches from {} ({} files missing)",
        store.len(),
        config.data_path.display(),
        missing.len()
    );

    Ok(LoadOutcome { store, missing })
}

pub fn load_snapshot(path: &Path, options: &LoadOptions) -> Result<Snapshot> {
    let file = File::open(path)?;
    read_snapshot(file, options)
}

/// Reads an export whose first line is a banner and whose second line is the header.
///
/// Short records are padded with nulls and long records are truncated to the header width.
pub fn read_snapshot<R: Read>(reader: R, options: &LoadOptions) -> Result<Snapshot> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv_reader.records();

    let Some(header) = read_header(&mut records)? else {
        return Ok(Snapshot::default());
    };

    let columns: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let entity_idx = columns.iter().position(|c| *c == options.entity_column);
    let width = columns.len();
    let mut snapshot = Snapshot::new(columns);

    for record in records {
        let record = record?;
        let row = (0..width)
            .map(|idx| options.parse_cell(record.get(idx).unwrap_or(""), Some(idx) == entity_idx))
            .collect();
        snapshot.push_row(row)?;
    }

    Ok(snapshot)
}

fn read_header<I>(records: &mut I) -> Result<Option<StringRecord>>
where
    I: Iterator<Item = csv::Result<StringRecord>>,
{
    // banner line
    match records.next() {
        None => return Ok(None),
        Some(banner) => {
            banner?;
        }
    }
    match records.next() {
        None => Ok(None),
        Some(header) => Ok(Some(header?)),
    }
}

/// Reads the entity codes from a plain code-list CSV (header on the first line, no banner).
///
/// Codes stay as text. A missing file yields an empty list.
pub fn load_code_list(path: &Path, entity_column: &str) -> Result<Vec<String>> {
    if !path.exists() {
        debug!("No code list at {}", path.display());
        return Ok(Vec::new());
    }

    let mut csv_reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let entity_idx = csv_reader
        .headers()?
        .iter()
        .position(|h| h.trim() == entity_column)
        .ok_or_else(|| SnapshotError::MissingColumn {
            batch: path.display().to_string(),
            column: entity_column.to_string(),
        })?;

    let mut codes = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let code = record.get(entity_idx).unwrap_or("").trim();
        if !code.is_empty() {
            codes.push(code.to_string());
        }
    }

    debug!("Read {} codes from {}", codes.len(), path.display());
    Ok(codes)
}

/// Returns the header of every configured file that exists, without reading data rows.
pub fn probe_headers(config: &PipelineConfig) -> Result<Vec<HeaderProbe>> {
    let mut probes = Vec::new();

    for kind in &config.document_kinds {
        for label in &config.period_labels {
            let path = batch_path(&config.data_path, label, kind);
            if !path.exists() {
                continue;
            }

            let file = File::open(&path)?;
            let mut csv_reader = ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(file);
            let columns = read_header(&mut csv_reader.records())?
                .map(|h| h.iter().map(|c| c.trim().to_string()).collect())
                .unwrap_or_default();

            probes.push(HeaderProbe {
                kind: kind.clone(),
                label: label.clone(),
                columns,
            });
        }
    }

    Ok(probes)
}
