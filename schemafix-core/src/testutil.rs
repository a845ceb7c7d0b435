//! In-memory stores and scripted prompts for engine tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use crate::executor::ConfirmationGate;
use crate::metadata::{MetadataError, MetadataStore};
use crate::naming::DatasetId;
use crate::schema::class_name;
use crate::vector::{DeleteStatus, StoreError, VectorStore};

/// A mutating call observed by [`MemoryVectorStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Delete(String),
    Create(String),
}

/// Vector store holding definitions in listing order.
#[derive(Default)]
pub struct MemoryVectorStore {
    definitions: Mutex<Vec<Value>>,
    mutations: Mutex<Vec<Mutation>>,
    counts: Mutex<HashMap<String, u64>>,
    get_failures: Mutex<HashMap<String, StoreError>>,
    delete_failure: Mutex<Option<StoreError>>,
    create_failure: Mutex<Option<StoreError>>,
    unreachable: Mutex<bool>,
}

impl MemoryVectorStore {
    pub fn new(definitions: Vec<Value>) -> Self {
        Self {
            definitions: Mutex::new(definitions),
            ..Self::default()
        }
    }

    /// Every call fails with a connectivity error.
    pub fn unreachable() -> Self {
        let store = Self::default();
        *store.unreachable.lock().unwrap() = true;
        store
    }

    /// Fetching `name` fails with `error`; listing is unaffected.
    pub fn fail_gets_with(&self, name: &str, error: StoreError) {
        self.get_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), error);
    }

    pub fn fail_deletes_with(&self, error: StoreError) {
        *self.delete_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_creates_with(&self, error: StoreError) {
        *self.create_failure.lock().unwrap() = Some(error);
    }

    pub fn set_object_count(&self, name: &str, count: u64) {
        self.counts.lock().unwrap().insert(name.to_string(), count);
    }

    pub fn definitions(&self) -> Vec<Value> {
        self.definitions.lock().unwrap().clone()
    }

    pub fn definition(&self, name: &str) -> Option<Value> {
        self.definitions
            .lock()
            .unwrap()
            .iter()
            .find(|d| class_name(d) == Some(name))
            .cloned()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if *self.unreachable.lock().unwrap() {
            Err(StoreError::Connectivity("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl VectorStore for MemoryVectorStore {
    async fn ready(&self) -> Result<(), StoreError> {
        self.check_reachable()
    }

    async fn list_definitions(&self) -> Result<Vec<Value>, StoreError> {
        self.check_reachable()?;
        Ok(self.definitions())
    }

    async fn get_definition(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.check_reachable()?;
        if let Some(err) = self.get_failures.lock().unwrap().get(name).cloned() {
            return Err(err);
        }
        Ok(self.definition(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<DeleteStatus, StoreError> {
        self.check_reachable()?;
        self.mutations
            .lock()
            .unwrap()
            .push(Mutation::Delete(name.to_string()));
        if let Some(err) = self.delete_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut definitions = self.definitions.lock().unwrap();
        let before = definitions.len();
        definitions.retain(|d| class_name(d) != Some(name));
        Ok(if definitions.len() < before {
            DeleteStatus::Deleted
        } else {
            DeleteStatus::AlreadyAbsent
        })
    }

    async fn create_collection(&self, definition: &Value) -> Result<(), StoreError> {
        self.check_reachable()?;
        let name = class_name(definition).unwrap_or_default().to_string();
        self.mutations
            .lock()
            .unwrap()
            .push(Mutation::Create(name.clone()));
        if let Some(err) = self.create_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut definitions = self.definitions.lock().unwrap();
        if definitions.iter().any(|d| class_name(d) == Some(name.as_str())) {
            return Err(StoreError::Rejected {
                status: 422,
                message: format!("class name {name} already exists"),
            });
        }
        definitions.push(definition.clone());
        Ok(())
    }

    async fn object_count(&self, name: &str) -> Result<u64, StoreError> {
        self.check_reachable()?;
        if self.definition(name).is_none() {
            return Err(StoreError::Rejected {
                status: 200,
                message: format!("Cannot query field \"{name}\" on type \"AggregateObjectsObj\"."),
            });
        }
        Ok(self.counts.lock().unwrap().get(name).copied().unwrap_or(0))
    }
}

/// Metadata store backed by maps.
#[derive(Default)]
pub struct MemoryMetadataStore {
    datasets: BTreeMap<DatasetId, String>,
    segments: HashMap<DatasetId, u64>,
    failure: Option<MetadataError>,
}

impl MemoryMetadataStore {
    pub fn with_datasets(datasets: &[(&str, &str)]) -> Self {
        Self {
            datasets: datasets
                .iter()
                .map(|(id, name)| (DatasetId::new(*id), name.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: MetadataError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn with_segments(mut self, id: &str, count: u64) -> Self {
        self.segments.insert(DatasetId::new(id), count);
        self
    }

    fn check(&self) -> Result<(), MetadataError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl MetadataStore for MemoryMetadataStore {
    async fn list_dataset_ids(
        &self,
    ) -> Result<std::collections::BTreeSet<DatasetId>, MetadataError> {
        self.check()?;
        Ok(self.datasets.keys().cloned().collect())
    }

    async fn dataset_names(
        &self,
        ids: &[DatasetId],
    ) -> Result<HashMap<DatasetId, String>, MetadataError> {
        self.check()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.datasets.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    async fn segment_count(&self, id: &DatasetId) -> Result<u64, MetadataError> {
        self.check()?;
        Ok(self.segments.get(id).copied().unwrap_or(0))
    }
}

/// Confirmation gate answering from a script and recording what it was asked.
pub struct ScriptedGate {
    batch_answer: bool,
    collection_answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedGate {
    pub fn accepting() -> Self {
        Self::new(true, Vec::new())
    }

    pub fn declining() -> Self {
        Self::new(false, Vec::new())
    }

    /// Answers per-collection prompts in order; unscripted prompts are declined.
    pub fn per_collection(answers: Vec<bool>) -> Self {
        Self::new(false, answers)
    }

    fn new(batch_answer: bool, answers: Vec<bool>) -> Self {
        Self {
            batch_answer,
            collection_answers: Mutex::new(answers.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far: `batch:<names>` or `collection:<name>`.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl ConfirmationGate for ScriptedGate {
    fn confirm_batch(&self, collections: &[String]) -> bool {
        self.asked
            .lock()
            .unwrap()
            .push(format!("batch:{}", collections.join(",")));
        self.batch_answer
    }

    fn confirm_collection(&self, name: &str) -> bool {
        self.asked.lock().unwrap().push(format!("collection:{name}"));
        self.collection_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false)
    }
}
