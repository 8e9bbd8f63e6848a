use crate::error::{Result, SnapshotError};
use crate::snapshot::{NaturalKey, PeriodLabel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CutoffMode {
    #[default]
    #[schemars(description = "Only periods strictly before January 1st of the authoritative year are used as replacement source.")]
    Strict,

    #[schemars(description = "Periods on or before January 1st of the authoritative year are used as replacement source.")]
    Inclusive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    #[default]
    #[schemars(description = "A repeated natural key in the authoritative batch keeps its last row. A warning is recorded.")]
    LastWriteWins,

    #[schemars(description = "A repeated natural key in the authoritative batch aborts reconciliation.")]
    Reject,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[default]
    #[schemars(description = "Every shared non-key cell is copied, so a null source cell clears the target.")]
    Overwrite,

    #[schemars(description = "Null source cells leave the target value in place.")]
    KeepTarget,
}

/// Options consumed by the reconciler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcileOptions {
    pub natural_key: NaturalKey,
    pub cutoff_mode: CutoffMode,
    pub key_policy: KeyPolicy,
    pub null_policy: NullPolicy,
}

/// Options consumed by the content hasher and the duplicate detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestOptions {
    pub ignore_row_order: bool,
    pub ignore_column_order: bool,
}

impl DigestOptions {
    pub fn new(ignore_row_order: bool, ignore_column_order: bool) -> Self {
        Self {
            ignore_row_order,
            ignore_column_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default = "default_data_path")]
    #[schemars(description = "Root directory holding one sub-directory per period label")]
    pub data_path: PathBuf,

    #[schemars(description = "File names of the statement exports, e.g. 'fy-balance-sheet.csv'")]
    pub document_kinds: Vec<String>,

    #[schemars(description = "Batch labels in load order, e.g. ['2023', '2024', '2025']")]
    pub period_labels: Vec<PeriodLabel>,

    #[schemars(description = "The most recent batch, trusted to correct restated figures in older batches")]
    pub authoritative_label: PeriodLabel,

    #[serde(default = "default_true")]
    pub ignore_row_order: bool,

    #[serde(default)]
    pub ignore_column_order: bool,

    #[serde(default)]
    pub natural_key: NaturalKey,

    #[serde(default = "default_null_tokens")]
    #[schemars(description = "Literal cell texts read as missing on ingestion")]
    pub null_tokens: Vec<String>,

    #[serde(default)]
    pub cutoff_mode: CutoffMode,

    #[serde(default)]
    pub key_policy: KeyPolicy,

    #[serde(default)]
    pub null_policy: NullPolicy,

    #[serde(default)]
    #[schemars(description = "Fail before reconciling when two batches hold identical content")]
    pub strict_duplicates: bool,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

pub fn default_null_tokens() -> Vec<String> {
    vec!["-".to_string(), "0".to_string()]
}

impl PipelineConfig {
    pub fn new(
        document_kinds: Vec<String>,
        period_labels: Vec<PeriodLabel>,
        authoritative_label: PeriodLabel,
    ) -> Self {
        Self {
            data_path: default_data_path(),
            document_kinds,
            period_labels,
            authoritative_label,
            ignore_row_order: true,
            ignore_column_order: false,
            natural_key: NaturalKey::default(),
            null_tokens: default_null_tokens(),
            cutoff_mode: CutoffMode::default(),
            key_policy: KeyPolicy::default(),
            null_policy: NullPolicy::default(),
            strict_duplicates: false,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.document_kinds.is_empty() {
            return Err(SnapshotError::InvalidConfig(
                "document_kinds must not be empty".to_string(),
            ));
        }
        if self.period_labels.is_empty() {
            return Err(SnapshotError::InvalidConfig(
                "period_labels must not be empty".to_string(),
            ));
        }
        if self.natural_key.entity_column == self.natural_key.period_column {
            return Err(SnapshotError::InvalidConfig(format!(
                "natural key columns must differ, both are '{}'",
                self.natural_key.entity_column
            )));
        }
        self.authoritative_label.cutoff()?;
        Ok(())
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            natural_key: self.natural_key.clone(),
            cutoff_mode: self.cutoff_mode,
            key_policy: self.key_policy,
            null_policy: self.null_policy,
        }
    }

    pub fn digest_options(&self) -> DigestOptions {
        DigestOptions::new(self.ignore_row_order, self.ignore_column_order)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
