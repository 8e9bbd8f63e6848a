use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Duplicate snapshots detected: {}", format_groups(.groups))]
    DuplicateData { groups: Vec<Vec<String>> },

    #[error("Unsupported conversion target '{0}': expected int, float or str")]
    UnsupportedConversion(String),

    #[error("Schema mismatch on column '{column}': expected {expected}, found {found}")]
    SchemaMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Snapshot {batch} has no column '{column}'")]
    MissingColumn { batch: String, column: String },

    #[error("Natural key ({entity}, {period}) appears more than once in {batch}")]
    DuplicateNaturalKey {
        batch: String,
        entity: String,
        period: String,
    },

    #[error("Invalid period label '{0}': expected a leading four-digit year")]
    InvalidPeriodLabel(String),

    #[error("Row {row} has {found} cells but the header has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_groups(groups: &[Vec<String>]) -> String {
    groups
        .iter()
        .map(|group| format!("[{}]", group.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
