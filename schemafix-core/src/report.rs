use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::executor::{Action, MigrationOutcome, SkipReason};
use crate::metadata::MetadataStore;
use crate::naming::DatasetId;

/// Best-effort dataset names. A failed lookup leaves the map empty and
/// records why, so callers can fall back to raw ids.
#[derive(Debug, Clone, Default)]
pub struct NameLookup {
    names: HashMap<DatasetId, String>,
    error: Option<String>,
}

impl NameLookup {
    pub async fn resolve<M: MetadataStore>(metadata: &M, ids: &[DatasetId]) -> Self {
        match metadata.dataset_names(ids).await {
            Ok(names) => Self { names, error: None },
            Err(e) => {
                log::warn!("Dataset name lookup failed: {e}");
                Self {
                    names: HashMap::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn name(&self, id: &DatasetId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub recreated: usize,
    pub simulated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffectedDataset {
    pub dataset_id: DatasetId,
    pub collection_name: String,
    /// `None` when the name could not be looked up.
    pub name: Option<String>,
}

/// A dry-run result: the definition the collection would be recreated with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedRecreation {
    pub collection_name: String,
    pub translated: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCollection {
    pub collection_name: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualRecreation {
    pub collection_name: String,
    pub detail: String,
    pub legacy_definition: Value,
}

/// Summary of a run: what happened, which datasets must be re-embedded, and
/// which collections need an operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub counts: ActionCounts,
    pub affected: Vec<AffectedDataset>,
    pub name_lookup_error: Option<String>,
    /// Recreated collections whose name maps to no dataset.
    pub recreated_without_dataset: Vec<String>,
    pub simulated: Vec<SimulatedRecreation>,
    pub failures: Vec<FailedCollection>,
    pub manual_recreation: Vec<ManualRecreation>,
    pub unclassifiable: Vec<String>,
    pub not_found: Vec<String>,
    pub declined: Vec<String>,
}

impl ReconciliationReport {
    pub async fn build<M: MetadataStore>(outcomes: &[MigrationOutcome], metadata: &M) -> Self {
        let mut report = Self::default();
        let mut affected_ids = Vec::new();

        for outcome in outcomes {
            let name = outcome.collection_name.clone();
            match &outcome.action {
                Action::Recreated => {
                    report.counts.recreated += 1;
                    match &outcome.affected_dataset_id {
                        Some(id) => affected_ids.push((id.clone(), name)),
                        None => report.recreated_without_dataset.push(name),
                    }
                }
                Action::Simulated { translated } => {
                    report.counts.simulated += 1;
                    report.simulated.push(SimulatedRecreation {
                        collection_name: name,
                        translated: translated.clone(),
                    });
                }
                Action::Skipped { reason } => {
                    report.counts.skipped += 1;
                    match reason {
                        SkipReason::Unclassifiable => report.unclassifiable.push(name),
                        SkipReason::NotFound => report.not_found.push(name),
                        SkipReason::Declined => report.declined.push(name),
                        SkipReason::NotLegacy => {}
                    }
                }
                Action::Failed { failure } => {
                    report.counts.failed += 1;
                    report.failures.push(FailedCollection {
                        collection_name: name.clone(),
                        detail: failure.detail(),
                    });
                    if let Some(definition) = failure.legacy_definition() {
                        report.manual_recreation.push(ManualRecreation {
                            collection_name: name,
                            detail: failure.detail(),
                            legacy_definition: definition.clone(),
                        });
                    }
                }
            }
        }

        if !affected_ids.is_empty() {
            let ids: Vec<DatasetId> = affected_ids.iter().map(|(id, _)| id.clone()).collect();
            let lookup = NameLookup::resolve(metadata, &ids).await;
            report.name_lookup_error = lookup.error().map(str::to_string);
            report.affected = affected_ids
                .into_iter()
                .map(|(dataset_id, collection_name)| AffectedDataset {
                    name: lookup.name(&dataset_id).map(str::to_string),
                    dataset_id,
                    collection_name,
                })
                .collect();
        }
        report
    }

    pub fn requires_manual_recreation(&self) -> bool {
        !self.manual_recreation.is_empty()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

const RULE: &str = "======================================================================";

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "Summary")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Recreated: {}", self.counts.recreated)?;
        if self.counts.simulated > 0 {
            writeln!(f, "Simulated: {}", self.counts.simulated)?;
        }
        writeln!(f, "Skipped:   {}", self.counts.skipped)?;
        writeln!(f, "Failed:    {}", self.counts.failed)?;

        if !self.simulated.is_empty() {
            writeln!(f, "\nWould delete and recreate (dry run, nothing changed):")?;
            for entry in &self.simulated {
                writeln!(f, "\n  Collection: {}", entry.collection_name)?;
                writeln!(f, "  New definition:")?;
                write_indented_json(f, &entry.translated)?;
            }
        }

        if !self.failures.is_empty() {
            writeln!(f, "\nFailed collections:")?;
            for failure in &self.failures {
                writeln!(f, "  - {}: {}", failure.collection_name, failure.detail)?;
            }
        }

        if !self.manual_recreation.is_empty() {
            writeln!(f, "\n{RULE}")?;
            writeln!(f, "MANUAL RECREATION REQUIRED")?;
            writeln!(f, "{RULE}")?;
            writeln!(
                f,
                "These collections were deleted, or may have been, and were not recreated."
            )?;
            writeln!(
                f,
                "Recreate each one from its saved definition (POST /v1/schema) before re-embedding."
            )?;
            for entry in &self.manual_recreation {
                writeln!(f, "\n  Collection: {}", entry.collection_name)?;
                writeln!(f, "  Error: {}", entry.detail)?;
                writeln!(f, "  Saved definition:")?;
                write_indented_json(f, &entry.legacy_definition)?;
            }
        }

        if !self.unclassifiable.is_empty() {
            writeln!(
                f,
                "\nUnrecognised schema (left untouched, inspect manually):"
            )?;
            for name in &self.unclassifiable {
                writeln!(f, "  - {name}")?;
            }
        }

        if !self.not_found.is_empty() {
            writeln!(f, "\nNo longer in the store:")?;
            for name in &self.not_found {
                writeln!(f, "  - {name}")?;
            }
        }

        if !self.declined.is_empty() {
            writeln!(f, "\nNot confirmed (unchanged):")?;
            for name in &self.declined {
                writeln!(f, "  - {name}")?;
            }
        }

        if !self.affected.is_empty() || !self.recreated_without_dataset.is_empty() {
            writeln!(f, "\n{RULE}")?;
            writeln!(f, "Next steps: re-embed these knowledge bases")?;
            writeln!(f, "{RULE}")?;
            writeln!(
                f,
                "Their vectors were deleted. In the host application, switch each dataset's\n\
                 embedding model, save, then switch it back to trigger re-embedding."
            )?;
            for dataset in &self.affected {
                writeln!(
                    f,
                    "\n  - {}",
                    dataset.name.as_deref().unwrap_or(dataset.dataset_id.as_str())
                )?;
                writeln!(f, "    ID: {}", dataset.dataset_id)?;
                writeln!(f, "    Collection: {}", dataset.collection_name)?;
            }
            for name in &self.recreated_without_dataset {
                writeln!(f, "\n  - {name}")?;
                writeln!(
                    f,
                    "    (no dataset id in the collection name; find its owner by hand)"
                )?;
            }
            if let Some(error) = &self.name_lookup_error {
                writeln!(f, "\n  (dataset names unavailable, raw ids shown: {error})")?;
            }
        }

        if self.counts.recreated > 0 || !self.manual_recreation.is_empty() {
            writeln!(
                f,
                "\nDeleted collections cannot be restored by this tool; there is no rollback."
            )?;
        }
        Ok(())
    }
}

fn write_indented_json(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    for line in pretty.lines() {
        writeln!(f, "    {line}")?;
    }
    Ok(())
}
