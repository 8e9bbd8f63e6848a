use crate::duplicates::DuplicateGroups;
use crate::reconciler::{BatchUpdate, ReconcileOutcome, ReconcileWarning};
use crate::snapshot::BatchKey;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroupReport {
    pub digest: String,
    pub batches: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct OutcomeReport<'a> {
    updates: Vec<UpdateRow<'a>>,
    warnings: &'a [ReconcileWarning],
}

#[derive(Debug, Clone, Serialize)]
struct UpdateRow<'a> {
    batch: &'a BatchKey,
    #[serde(flatten)]
    update: &'a BatchUpdate,
}

pub fn duplicate_reports(groups: &DuplicateGroups<BatchKey>) -> Vec<DuplicateGroupReport> {
    groups
        .iter()
        .map(|(digest, keys)| DuplicateGroupReport {
            digest: digest.to_hex(),
            batches: keys.iter().map(|k| k.to_string()).collect(),
        })
        .collect()
}

pub fn duplicates_to_json(groups: &DuplicateGroups<BatchKey>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&duplicate_reports(groups))
}

pub fn duplicates_to_markdown(groups: &DuplicateGroups<BatchKey>) -> String {
    let mut output = String::new();
    output.push_str("# Duplicate Snapshots\n\n");

    if groups.is_empty() {
        output.push_str("No duplicate snapshots found.\n");
        return output;
    }

    output.push_str("| Digest | Batches |\n");
    output.push_str("|--------|---------|\n");
    for report in duplicate_reports(groups) {
        output.push_str(&format!(
            "| `{}` | {} |\n",
            report.digest,
            report.batches.join(", ")
        ));
    }

    output
}

pub fn outcome_to_json(outcome: &ReconcileOutcome) -> Result<String, serde_json::Error> {
    let report = OutcomeReport {
        updates: outcome
            .updates
            .iter()
            .map(|(batch, update)| UpdateRow { batch, update })
            .collect(),
        warnings: &outcome.warnings,
    };
    serde_json::to_string_pretty(&report)
}

pub fn outcome_to_markdown(outcome: &ReconcileOutcome) -> String {
    let mut output = String::new();
    output.push_str("# Reconciliation Summary\n\n");

    output.push_str("## Updated Batches\n\n");
    if outcome.updates.is_empty() {
        output.push_str("No batches were compared.\n\n");
    } else {
        output.push_str("| Batch | Rows Matched | Cells Changed |\n");
        output.push_str("|-------|--------------|---------------|\n");
        for (batch, update) in &outcome.updates {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                batch, update.rows_matched, update.cells_changed
            ));
        }
        output.push('\n');
    }

    output.push_str(&format!(
        "**Total Cells Changed:** {}\n\n",
        outcome.total_cells_changed()
    ));

    if !outcome.warnings.is_empty() {
        output.push_str("## Warnings\n\n");
        for warning in &outcome.warnings {
            output.push_str(&format!("- {}\n", warning));
        }
    }

    output
}
