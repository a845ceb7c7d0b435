//! Delete-then-recreate migration of legacy collections.
//!
//! The store cannot change a collection's vector configuration in place, so a
//! legacy collection is dropped and created again from its translated
//! definition. Stored vectors are lost; the affected datasets must be
//! re-embedded from the host application afterwards. There is no rollback.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::EngineError;
use crate::inventory::CollectionDescriptor;
use crate::journal::{EntryState, Journal, JournalError};
use crate::naming::DatasetId;
use crate::schema::{SchemaForm, TranslationError, classify, translate};
use crate::vector::{DeleteStatus, StoreError, VectorStore};

/// Asks the operator before destructive work starts.
pub trait ConfirmationGate: Send + Sync {
    /// One answer for every legacy collection in the batch.
    fn confirm_batch(&self, collections: &[String]) -> bool;
    fn confirm_collection(&self, name: &str) -> bool;
}

/// How a live batch is authorised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Batch,
    PerCollection,
    /// Authorised up front, e.g. by `--yes`.
    Preconfirmed,
}

pub enum Mode<'a> {
    /// Translate and report; nothing is written to the store.
    DryRun,
    Live {
        gate: &'a dyn ConfirmationGate,
        journal: &'a Journal,
        confirmation: Confirmation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already current.
    NotLegacy,
    /// Neither legacy nor current; never touched automatically.
    Unclassifiable,
    NotFound,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// The definition could not be read; the collection was not touched.
    FetchFailed { detail: String },
    /// Required tuning fields are missing; the collection was not touched.
    TranslationIncomplete { missing: Vec<&'static str> },
    /// The store refused the delete; the legacy collection is intact.
    DeleteRejected { detail: String },
    /// The store stopped answering during the delete. The collection may or
    /// may not still exist.
    DeleteUnconfirmed {
        detail: String,
        legacy_definition: Value,
    },
    /// The collection was deleted but could not be created again.
    Recreation {
        detail: String,
        legacy_definition: Value,
    },
}

impl Failure {
    pub fn detail(&self) -> String {
        match self {
            Self::TranslationIncomplete { missing } => {
                TranslationError::Incomplete {
                    missing: missing.clone(),
                }
                .to_string()
            }
            Self::FetchFailed { detail } => format!("could not read definition: {detail}"),
            Self::DeleteRejected { detail } => format!("delete rejected: {detail}"),
            Self::DeleteUnconfirmed { detail, .. } => format!("delete unconfirmed: {detail}"),
            Self::Recreation { detail, .. } => format!("recreation failed: {detail}"),
        }
    }

    /// The legacy definition, when the collection may be gone from the store.
    pub fn legacy_definition(&self) -> Option<&Value> {
        match self {
            Self::DeleteUnconfirmed {
                legacy_definition, ..
            }
            | Self::Recreation {
                legacy_definition, ..
            } => Some(legacy_definition),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Skipped { reason: SkipReason },
    Simulated { translated: Value },
    Recreated,
    Failed { failure: Failure },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Simulated { .. } => "simulated",
            Self::Recreated => "recreated",
            Self::Failed { .. } => "failed",
        }
    }
}

/// What happened to one collection during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationOutcome {
    pub collection_name: String,
    /// `None` when the collection could not be read.
    pub previous_form: Option<SchemaForm>,
    pub action: Action,
    /// Set when the collection was recreated and its dataset must be
    /// re-embedded.
    pub affected_dataset_id: Option<DatasetId>,
}

impl MigrationOutcome {
    fn new(name: &str, previous_form: Option<SchemaForm>, action: Action) -> Self {
        Self {
            collection_name: name.to_string(),
            previous_form,
            action,
            affected_dataset_id: None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.action {
            Action::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    /// Present iff the outcome is a failure.
    pub fn error_detail(&self) -> Option<String> {
        self.failure().map(Failure::detail)
    }
}

/// Outcomes of a run, in the order collections were processed.
#[derive(Debug, Default)]
pub struct BatchRun {
    pub run_id: String,
    pub outcomes: Vec<MigrationOutcome>,
    /// The operator declined the batch.
    pub cancelled: bool,
    /// Set when the run stopped early; outcomes gathered so far are kept.
    pub aborted: Option<EngineError>,
}

impl BatchRun {
    pub fn has_recreation_failure(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.failure().is_some_and(|f| f.legacy_definition().is_some()))
    }

    fn record(&mut self, outcome: MigrationOutcome) {
        log::debug!(
            "{}: {} (was {})",
            outcome.collection_name,
            outcome.action.kind(),
            outcome
                .previous_form
                .map_or("unreadable", |form| form.as_str())
        );
        self.outcomes.push(outcome);
    }
}

/// A run-ending error, with the outcome of the collection it hit if one
/// was reached.
struct Abort {
    outcome: Option<MigrationOutcome>,
    error: EngineError,
}

impl From<StoreError> for Abort {
    fn from(error: StoreError) -> Self {
        Self {
            outcome: None,
            error: error.into(),
        }
    }
}

impl From<JournalError> for Abort {
    fn from(error: JournalError) -> Self {
        Self {
            outcome: None,
            error: error.into(),
        }
    }
}

pub struct Executor<'a, V> {
    store: &'a V,
    mode: Mode<'a>,
    pause_between: Duration,
}

impl<'a, V: VectorStore> Executor<'a, V> {
    pub fn new(store: &'a V, mode: Mode<'a>) -> Self {
        Self {
            store,
            mode,
            pause_between: Duration::ZERO,
        }
    }

    /// Wait this long between live migrations.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause_between = pause;
        self
    }

    fn is_live(&self) -> bool {
        matches!(self.mode, Mode::Live { .. })
    }

    /// Process every collection of a scan. Non-legacy collections are
    /// skipped; legacy ones are migrated (or simulated) one at a time.
    pub async fn run_batch(&self, collections: &[CollectionDescriptor]) -> BatchRun {
        let mut run = BatchRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..BatchRun::default()
        };
        let legacy: Vec<String> = collections
            .iter()
            .filter(|c| c.schema_form == SchemaForm::Legacy)
            .map(|c| c.name.clone())
            .collect();

        if let Mode::Live {
            gate,
            confirmation: Confirmation::Batch,
            ..
        } = &self.mode
        {
            if !legacy.is_empty() && !gate.confirm_batch(&legacy) {
                log::info!("Batch of {} collections declined", legacy.len());
                run.cancelled = true;
            }
        }

        let mut attempted = 0usize;
        for collection in collections {
            let name = collection.name.as_str();
            match collection.schema_form {
                SchemaForm::Legacy => {}
                SchemaForm::Current => {
                    run.record(skipped(name, collection.schema_form, SkipReason::NotLegacy));
                    continue;
                }
                SchemaForm::Unknown => {
                    run.record(skipped(name, collection.schema_form, SkipReason::Unclassifiable));
                    continue;
                }
            }

            if run.cancelled || !self.confirmed(name) {
                run.record(skipped(name, SchemaForm::Legacy, SkipReason::Declined));
                continue;
            }

            if self.is_live() && attempted > 0 && !self.pause_between.is_zero() {
                tokio::time::sleep(self.pause_between).await;
            }
            attempted += 1;

            match self.migrate(&run.run_id, name).await {
                Ok(outcome) => run.record(outcome),
                Err(abort) => {
                    log::error!("Stopping run at '{name}': {}", abort.error);
                    if let Some(outcome) = abort.outcome {
                        run.record(outcome);
                    }
                    run.aborted = Some(abort.error);
                    break;
                }
            }
        }
        run
    }

    /// Migrate a single named collection without prompting.
    pub async fn run_one(&self, name: &str) -> BatchRun {
        let mut run = BatchRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..BatchRun::default()
        };
        match self.migrate(&run.run_id, name).await {
            Ok(outcome) => run.record(outcome),
            Err(abort) => {
                if let Some(outcome) = abort.outcome {
                    run.record(outcome);
                }
                run.aborted = Some(abort.error);
            }
        }
        run
    }

    fn confirmed(&self, name: &str) -> bool {
        match &self.mode {
            Mode::Live {
                gate,
                confirmation: Confirmation::PerCollection,
                ..
            } => gate.confirm_collection(name),
            _ => true,
        }
    }

    async fn migrate(&self, run_id: &str, name: &str) -> Result<MigrationOutcome, Abort> {
        let fetched = match self.store.get_definition(name).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_connectivity() => return Err(e.into()),
            Err(e) => {
                log::error!("Could not read '{name}': {e}");
                return Ok(MigrationOutcome::new(
                    name,
                    None,
                    Action::Failed {
                        failure: Failure::FetchFailed {
                            detail: e.to_string(),
                        },
                    },
                ));
            }
        };
        let Some(definition) = fetched else {
            log::warn!("Collection '{name}' no longer exists");
            return Ok(MigrationOutcome::new(
                name,
                None,
                Action::Skipped {
                    reason: SkipReason::NotFound,
                },
            ));
        };

        let form = classify(&definition);
        let translated = match translate(&definition) {
            Ok(translated) => translated,
            Err(TranslationError::NotLegacy(_)) => {
                let reason = match form {
                    SchemaForm::Current => SkipReason::NotLegacy,
                    _ => SkipReason::Unclassifiable,
                };
                return Ok(skipped(name, form, reason));
            }
            Err(TranslationError::Incomplete { missing }) => {
                log::warn!("Not migrating '{name}': missing {}", missing.join(", "));
                return Ok(failed(name, Failure::TranslationIncomplete { missing }));
            }
        };

        let Mode::Live { journal, .. } = &self.mode else {
            log::info!("Dry run: '{name}' would be recreated with a default named vector");
            log::debug!("Translated definition for '{name}': {translated}");
            return Ok(MigrationOutcome::new(
                name,
                Some(form),
                Action::Simulated { translated },
            ));
        };

        let entry = journal.begin(run_id, name, &definition)?;

        log::info!("Deleting legacy collection '{name}'");
        match self.store.delete_collection(name).await {
            Ok(DeleteStatus::Deleted) => {}
            Ok(DeleteStatus::AlreadyAbsent) => {
                log::warn!("'{name}' was already gone when deleted; recreating anyway")
            }
            Err(e) if e.is_connectivity() => {
                let outcome = failed(
                    name,
                    Failure::DeleteUnconfirmed {
                        detail: e.to_string(),
                        legacy_definition: definition,
                    },
                );
                return Err(Abort {
                    outcome: Some(outcome),
                    error: e.into(),
                });
            }
            Err(e) => {
                log::error!("Delete of '{name}' rejected: {e}");
                let outcome = failed(
                    name,
                    Failure::DeleteRejected {
                        detail: e.to_string(),
                    },
                );
                return finish(journal, entry, EntryState::DeleteRejected, Some(&e), outcome);
            }
        }

        log::info!("Recreating '{name}' with a default named vector");
        match self.store.create_collection(&translated).await {
            Ok(()) => {
                let mut outcome = MigrationOutcome::new(name, Some(form), Action::Recreated);
                outcome.affected_dataset_id = DatasetId::from_collection_name(name);
                finish(journal, entry, EntryState::Recreated, None, outcome)
            }
            Err(e) => {
                log::error!("Recreation of '{name}' failed, manual recreation required: {e}");
                let outcome = failed(
                    name,
                    Failure::Recreation {
                        detail: e.to_string(),
                        legacy_definition: definition,
                    },
                );
                let result =
                    finish(journal, entry, EntryState::RecreationFailed, Some(&e), outcome);
                match result {
                    Ok(outcome) if e.is_connectivity() => Err(Abort {
                        outcome: Some(outcome),
                        error: e.into(),
                    }),
                    other => other,
                }
            }
        }
    }
}

fn skipped(name: &str, form: SchemaForm, reason: SkipReason) -> MigrationOutcome {
    MigrationOutcome::new(name, Some(form), Action::Skipped { reason })
}

fn failed(name: &str, failure: Failure) -> MigrationOutcome {
    MigrationOutcome::new(name, Some(SchemaForm::Legacy), Action::Failed { failure })
}

/// Close a journal entry. If the journal cannot be updated the run stops,
/// but the outcome already reached is kept.
fn finish(
    journal: &Journal,
    entry: i64,
    state: EntryState,
    error: Option<&StoreError>,
    outcome: MigrationOutcome,
) -> Result<MigrationOutcome, Abort> {
    let detail = error.map(ToString::to_string);
    match journal.finish(entry, state, detail.as_deref()) {
        Ok(()) => Ok(outcome),
        Err(e) => Err(Abort {
            outcome: Some(outcome),
            error: e.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Inventory, Scope};
    use crate::schema::{VectorIndexSpec, fixtures};
    use crate::testutil::{MemoryMetadataStore, MemoryVectorStore, Mutation, ScriptedGate};
    use serde_json::{Number, json};

    const A_ID: &str = "0b6a1c3e-7d2f-4e8a-9c41-5f2d8e7a6b10";

    fn a_name() -> String {
        DatasetId::new(A_ID).collection_name()
    }

    /// Store with A (legacy, cosine/128/32), B (current) and C (legacy, no
    /// efConstruction).
    fn scenario() -> MemoryVectorStore {
        MemoryVectorStore::new(vec![
            fixtures::legacy(&a_name(), "cosine", 128, 32),
            fixtures::current("B"),
            fixtures::legacy_without("C", "efConstruction"),
        ])
    }

    async fn scan(store: &MemoryVectorStore) -> Vec<CollectionDescriptor> {
        let metadata = MemoryMetadataStore::default();
        Inventory::new(store, &metadata, Scope::All)
            .list_collections()
            .await
            .unwrap()
    }

    fn actions(run: &BatchRun) -> Vec<(String, &'static str)> {
        run.outcomes
            .iter()
            .map(|o| (o.collection_name.clone(), o.action.kind()))
            .collect()
    }

    #[tokio::test]
    async fn fix_recreates_legacy_skips_current_and_reports_incomplete() {
        let store = scenario();
        let collections = scan(&store).await;
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let executor = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        );

        let run = executor.run_batch(&collections).await;
        assert!(run.aborted.is_none());
        assert_eq!(
            actions(&run),
            vec![
                (a_name(), "recreated"),
                ("B".to_string(), "skipped"),
                ("C".to_string(), "failed"),
            ]
        );
        assert_eq!(gate.asked(), vec![format!("batch:{},C", a_name())]);

        let a = store.definition(&a_name()).unwrap();
        assert_eq!(classify(&a), SchemaForm::Current);
        let spec = VectorIndexSpec::from_current(&a).unwrap();
        assert_eq!(spec.distance_metric, "cosine");
        assert_eq!(spec.ef_construction, Number::from(128));
        assert_eq!(spec.max_connections, Number::from(32));
        assert_eq!(
            run.outcomes[0].affected_dataset_id,
            Some(DatasetId::new(A_ID))
        );

        assert_eq!(
            run.outcomes[2].failure(),
            Some(&Failure::TranslationIncomplete {
                missing: vec!["efConstruction"]
            })
        );
        assert!(store.definition("C").is_some());
        assert_eq!(
            store.mutations(),
            vec![Mutation::Delete(a_name()), Mutation::Create(a_name())]
        );
        assert!(journal.needs_attention().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_never_mutates() {
        let store = scenario();
        let before = store.definitions();
        let collections = scan(&store).await;

        let run = Executor::new(&store, Mode::DryRun)
            .run_batch(&collections)
            .await;

        assert_eq!(store.definitions(), before);
        assert!(store.mutations().is_empty());
        assert_eq!(
            actions(&run),
            vec![
                (a_name(), "simulated"),
                ("B".to_string(), "skipped"),
                ("C".to_string(), "failed"),
            ]
        );
        match &run.outcomes[0].action {
            Action::Simulated { translated } => {
                assert_eq!(classify(translated), SchemaForm::Current)
            }
            other => panic!("expected Simulated, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_outcome_per_collection_and_per_legacy_collection() {
        let store = scenario();
        let collections = scan(&store).await;
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .run_batch(&collections)
        .await;

        let mut names: Vec<&str> = run
            .outcomes
            .iter()
            .map(|o| o.collection_name.as_str())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), run.outcomes.len());

        let legacy_outcomes = run
            .outcomes
            .iter()
            .filter(|o| o.previous_form == Some(SchemaForm::Legacy))
            .count();
        let legacy_in = collections
            .iter()
            .filter(|c| c.schema_form == SchemaForm::Legacy)
            .count();
        assert_eq!(legacy_outcomes, legacy_in);
    }

    #[tokio::test]
    async fn declined_batch_touches_nothing() {
        let store = scenario();
        let collections = scan(&store).await;
        let gate = ScriptedGate::declining();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .run_batch(&collections)
        .await;

        assert!(run.cancelled);
        assert!(store.mutations().is_empty());
        assert_eq!(
            run.outcomes[0].action,
            Action::Skipped {
                reason: SkipReason::Declined
            }
        );
        assert!(journal.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_prompt_when_nothing_is_legacy() {
        let store = MemoryVectorStore::new(vec![fixtures::current("B")]);
        let collections = scan(&store).await;
        let gate = ScriptedGate::declining();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .run_batch(&collections)
        .await;

        assert!(gate.asked().is_empty());
        assert!(!run.cancelled);
        assert_eq!(actions(&run), vec![("B".to_string(), "skipped")]);
    }

    #[tokio::test]
    async fn per_collection_confirmation_skips_declined() {
        let store = MemoryVectorStore::new(vec![
            fixtures::legacy("A", "cosine", 128, 32),
            fixtures::legacy("D", "dot", 64, 16),
        ]);
        let collections = scan(&store).await;
        let gate = ScriptedGate::per_collection(vec![false, true]);
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::PerCollection,
            },
        )
        .run_batch(&collections)
        .await;

        assert_eq!(gate.asked(), vec!["collection:A", "collection:D"]);
        assert_eq!(
            actions(&run),
            vec![("A".to_string(), "skipped"), ("D".to_string(), "recreated")]
        );
        assert_eq!(classify(&store.definition("A").unwrap()), SchemaForm::Legacy);
    }

    #[tokio::test]
    async fn fix_one_on_missing_collection_does_not_mutate() {
        let store = scenario();
        let gate = ScriptedGate::declining();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .run_one("Missing")
        .await;

        assert_eq!(run.outcomes.len(), 1);
        assert_eq!(
            run.outcomes[0].action,
            Action::Skipped {
                reason: SkipReason::NotFound
            }
        );
        assert_eq!(run.outcomes[0].previous_form, None);
        assert!(store.mutations().is_empty());
        assert!(gate.asked().is_empty());
    }

    #[tokio::test]
    async fn acts_on_fresh_definition_not_scan_snapshot() {
        let store = MemoryVectorStore::new(vec![fixtures::current("A")]);
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        // A stale scan that still thinks A is legacy.
        let stale = vec![
            CollectionDescriptor::from_definition(fixtures::legacy("A", "cosine", 128, 32))
                .unwrap(),
        ];
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Preconfirmed,
            },
        )
        .run_batch(&stale)
        .await;

        assert_eq!(
            run.outcomes[0].action,
            Action::Skipped {
                reason: SkipReason::NotLegacy
            }
        );
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn rejected_delete_keeps_collection_and_continues() {
        let store = MemoryVectorStore::new(vec![
            fixtures::legacy("A", "cosine", 128, 32),
            fixtures::legacy("D", "cosine", 128, 32),
        ]);
        store.fail_deletes_with(StoreError::Rejected {
            status: 403,
            message: "forbidden".into(),
        });
        let collections = scan(&store).await;
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Preconfirmed,
            },
        )
        .run_batch(&collections)
        .await;

        assert!(run.aborted.is_none());
        assert_eq!(
            actions(&run),
            vec![("A".to_string(), "failed"), ("D".to_string(), "failed")]
        );
        assert!(matches!(
            run.outcomes[0].failure(),
            Some(Failure::DeleteRejected { .. })
        ));
        assert!(!run.has_recreation_failure());
        assert_eq!(store.definitions().len(), 2);
        assert!(journal.needs_attention().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recreation_failure_preserves_legacy_definition() {
        let legacy = fixtures::legacy("A", "cosine", 128, 32);
        let store = MemoryVectorStore::new(vec![legacy.clone()]);
        store.fail_creates_with(StoreError::Rejected {
            status: 422,
            message: "invalid vectorConfig".into(),
        });
        let collections = scan(&store).await;
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .run_batch(&collections)
        .await;

        assert!(run.has_recreation_failure());
        let failure = run.outcomes[0].failure().unwrap();
        assert_eq!(failure.legacy_definition(), Some(&legacy));
        assert!(
            run.outcomes[0]
                .error_detail()
                .unwrap()
                .contains("invalid vectorConfig")
        );
        assert!(store.definition("A").is_none());

        let open = journal.needs_attention().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].state, EntryState::RecreationFailed);
        assert_eq!(open[0].legacy_definition, legacy);
    }

    #[tokio::test]
    async fn connectivity_loss_during_delete_aborts_with_journal_entry() {
        let store = MemoryVectorStore::new(vec![
            fixtures::legacy("A", "cosine", 128, 32),
            fixtures::legacy("D", "cosine", 128, 32),
        ]);
        store.fail_deletes_with(StoreError::Connectivity("connection reset".into()));
        let collections = scan(&store).await;
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .run_batch(&collections)
        .await;

        assert!(matches!(
            run.aborted,
            Some(EngineError::VectorStore(StoreError::Connectivity(_)))
        ));
        assert_eq!(actions(&run), vec![("A".to_string(), "failed")]);
        assert!(matches!(
            run.outcomes[0].failure(),
            Some(Failure::DeleteUnconfirmed { .. })
        ));
        let open = journal.needs_attention().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].state, EntryState::Deleting);
    }

    #[tokio::test]
    async fn unknown_collections_are_listed_not_touched() {
        let mut foreign = fixtures::legacy("E", "cosine", 128, 32);
        foreign["vectorizer"] = json!("text2vec-openai");
        let store = MemoryVectorStore::new(vec![foreign]);
        let collections = scan(&store).await;
        let run = Executor::new(&store, Mode::DryRun)
            .run_batch(&collections)
            .await;
        assert_eq!(
            run.outcomes[0].action,
            Action::Skipped {
                reason: SkipReason::Unclassifiable
            }
        );
        assert_eq!(run.outcomes[0].previous_form, Some(SchemaForm::Unknown));
    }

    #[tokio::test(start_paused = true)]
    async fn live_runs_pause_between_collections() {
        let store = MemoryVectorStore::new(vec![
            fixtures::legacy("A", "cosine", 128, 32),
            fixtures::legacy("D", "cosine", 128, 32),
        ]);
        let collections = scan(&store).await;
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let started = tokio::time::Instant::now();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Batch,
            },
        )
        .with_pause(Duration::from_millis(500))
        .run_batch(&collections)
        .await;

        assert_eq!(run.outcomes.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn rejected_fetch_fails_one_collection_and_batch_continues() {
        let store = MemoryVectorStore::new(vec![
            fixtures::legacy("A", "cosine", 128, 32),
            fixtures::legacy("D", "cosine", 128, 32),
        ]);
        let collections = scan(&store).await;
        store.fail_gets_with(
            "A",
            StoreError::Rejected {
                status: 500,
                message: "shard error".into(),
            },
        );
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Preconfirmed,
            },
        )
        .run_batch(&collections)
        .await;

        assert!(run.aborted.is_none());
        assert_eq!(
            actions(&run),
            vec![("A".to_string(), "failed"), ("D".to_string(), "recreated")]
        );
        assert!(matches!(
            run.outcomes[0].failure(),
            Some(Failure::FetchFailed { detail }) if detail.contains("shard error")
        ));
        assert_eq!(run.outcomes[0].previous_form, None);
        assert!(!run.has_recreation_failure());
        assert_eq!(
            store.mutations(),
            vec![Mutation::Delete("D".into()), Mutation::Create("D".into())]
        );
        assert_eq!(classify(&store.definition("A").unwrap()), SchemaForm::Legacy);
        assert_eq!(journal.entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fix_one_with_malformed_fetch_is_a_failed_outcome() {
        let store = MemoryVectorStore::new(vec![fixtures::legacy("A", "cosine", 128, 32)]);
        store.fail_gets_with("A", StoreError::Malformed("expected value at line 1".into()));
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Preconfirmed,
            },
        )
        .run_one("A")
        .await;

        assert!(run.aborted.is_none());
        assert!(matches!(
            run.outcomes[0].failure(),
            Some(Failure::FetchFailed { .. })
        ));
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn fix_one_unreachable_on_fetch_aborts_without_mutation() {
        let store = MemoryVectorStore::new(vec![fixtures::legacy("A", "cosine", 128, 32)]);
        store.fail_gets_with("A", StoreError::Connectivity("connection refused".into()));
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Preconfirmed,
            },
        )
        .run_one("A")
        .await;

        assert!(run.outcomes.is_empty());
        assert!(matches!(
            run.aborted,
            Some(EngineError::VectorStore(StoreError::Connectivity(_)))
        ));
        assert!(store.mutations().is_empty());
        assert!(journal.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fix_one_connection_lost_during_delete_leaves_deleting_entry() {
        let legacy = fixtures::legacy("A", "cosine", 128, 32);
        let store = MemoryVectorStore::new(vec![legacy.clone()]);
        store.fail_deletes_with(StoreError::Connectivity("connection reset".into()));
        let gate = ScriptedGate::accepting();
        let journal = Journal::open_in_memory().unwrap();
        let run = Executor::new(
            &store,
            Mode::Live {
                gate: &gate,
                journal: &journal,
                confirmation: Confirmation::Preconfirmed,
            },
        )
        .run_one("A")
        .await;

        assert!(matches!(
            run.aborted,
            Some(EngineError::VectorStore(StoreError::Connectivity(_)))
        ));
        assert_eq!(run.outcomes.len(), 1);
        let failure = run.outcomes[0].failure().unwrap();
        assert!(matches!(failure, Failure::DeleteUnconfirmed { .. }));
        assert_eq!(failure.legacy_definition(), Some(&legacy));
        assert!(run.has_recreation_failure());

        let open = journal.needs_attention().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].state, EntryState::Deleting);
    }
}
