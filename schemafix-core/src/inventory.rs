use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::config::ScopeConfig;
use crate::error::EngineError;
use crate::metadata::{MetadataError, MetadataStore};
use crate::naming::{DatasetId, is_managed_collection};
use crate::schema::{PROPERTIES, SchemaForm, class_name, classify};
use crate::vector::{StoreError, VectorStore};

const AUTO_SCHEMA_MARKER: &str = "auto-schema feature on ";

/// Snapshot of one collection as the store reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub schema_form: SchemaForm,
    pub raw_definition: Value,
    pub property_count: usize,
    pub dataset_id: Option<DatasetId>,
    /// Creation date the store's auto-schema feature wrote into a property
    /// description, if any.
    pub created_hint: Option<String>,
}

impl CollectionDescriptor {
    /// Build a descriptor from a definition. Fails only if the definition has
    /// no class name; anything else unrecognisable classifies as unknown.
    pub fn from_definition(definition: Value) -> Result<Self, StoreError> {
        let name = class_name(&definition)
            .ok_or_else(|| StoreError::Malformed("collection definition has no class name".into()))?
            .to_string();
        let properties = definition.get(PROPERTIES).and_then(Value::as_array);
        Ok(Self {
            dataset_id: DatasetId::from_collection_name(&name),
            schema_form: classify(&definition),
            property_count: properties.map_or(0, Vec::len),
            created_hint: properties.and_then(|props| created_hint(props)),
            raw_definition: definition,
            name,
        })
    }
}

fn created_hint(properties: &[Value]) -> Option<String> {
    properties
        .iter()
        .filter_map(|p| p.get("description").and_then(Value::as_str))
        .find_map(|d| d.split_once(AUTO_SCHEMA_MARKER))
        .map(|(_, date)| date.trim().to_string())
        .filter(|date| !date.is_empty())
}

/// Which collections a command considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only collections named after a host application dataset.
    Managed,
    All,
}

impl Scope {
    pub fn from_config(config: &ScopeConfig) -> Self {
        if config.include_unmanaged {
            Self::All
        } else {
            Self::Managed
        }
    }

    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::Managed => is_managed_collection(name),
            Self::All => true,
        }
    }
}

/// Result of a scan: collections in scope, in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub total_in_store: usize,
    /// Definitions without a class name. Never acted on.
    pub unnamed: usize,
    pub collections: Vec<CollectionDescriptor>,
}

impl ScanSummary {
    pub fn count(&self, form: SchemaForm) -> usize {
        self.collections
            .iter()
            .filter(|c| c.schema_form == form)
            .count()
    }

    pub fn with_form(&self, form: SchemaForm) -> impl Iterator<Item = &CollectionDescriptor> {
        self.collections.iter().filter(move |c| c.schema_form == form)
    }
}

/// Read-only view over both stores.
pub struct Inventory<'a, V, M> {
    vector: &'a V,
    metadata: &'a M,
    scope: Scope,
}

impl<'a, V: VectorStore, M: MetadataStore> Inventory<'a, V, M> {
    pub fn new(vector: &'a V, metadata: &'a M, scope: Scope) -> Self {
        Self {
            vector,
            metadata,
            scope,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Probe the store, then list and classify every collection in scope.
    pub async fn scan(&self) -> Result<ScanSummary, StoreError> {
        self.vector.ready().await?;
        let definitions = self.vector.list_definitions().await?;

        let mut summary = ScanSummary {
            total_in_store: definitions.len(),
            ..ScanSummary::default()
        };
        for definition in definitions {
            match CollectionDescriptor::from_definition(definition) {
                Ok(descriptor) if self.scope.includes(&descriptor.name) => {
                    summary.collections.push(descriptor)
                }
                Ok(descriptor) => log::debug!("Out of scope: {}", descriptor.name),
                Err(e) => {
                    log::warn!("Ignoring collection definition: {e}");
                    summary.unnamed += 1;
                }
            }
        }
        log::info!(
            "Scanned {} collections ({} in scope)",
            summary.total_in_store,
            summary.collections.len()
        );
        Ok(summary)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>, StoreError> {
        Ok(self.scan().await?.collections)
    }

    pub async fn list_dataset_ids(&self) -> Result<BTreeSet<DatasetId>, MetadataError> {
        self.metadata.list_dataset_ids().await
    }

    /// Fresh descriptor for one collection, regardless of scope.
    pub async fn fetch(&self, name: &str) -> Result<Option<CollectionDescriptor>, StoreError> {
        match self.vector.get_definition(name).await? {
            Some(definition) => CollectionDescriptor::from_definition(definition).map(Some),
            None => Ok(None),
        }
    }

    /// Managed collections whose dataset has no metadata row. Never deletes.
    pub async fn find_orphans(&self) -> Result<Vec<CollectionDescriptor>, EngineError> {
        let collections = self.list_collections().await?;
        let known = self.list_dataset_ids().await?;
        let orphans: Vec<CollectionDescriptor> = collections
            .into_iter()
            .filter(|c| c.dataset_id.as_ref().is_some_and(|id| !known.contains(id)))
            .collect();
        log::info!(
            "{} orphan collections against {} datasets",
            orphans.len(),
            known.len()
        );
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use crate::testutil::{MemoryMetadataStore, MemoryVectorStore};
    use serde_json::json;

    const D1: &str = "11111111-1111-4111-8111-111111111111";
    const D2: &str = "22222222-2222-4222-8222-222222222222";
    const D3: &str = "33333333-3333-4333-8333-333333333333";

    fn managed(id: &str) -> String {
        DatasetId::new(id).collection_name()
    }

    #[tokio::test]
    async fn scan_classifies_in_store_order() {
        let vector = MemoryVectorStore::new(vec![
            fixtures::legacy("A", "cosine", 128, 32),
            fixtures::current("B"),
            fixtures::legacy_without("C", "efConstruction"),
        ]);
        let metadata = MemoryMetadataStore::default();
        let inventory = Inventory::new(&vector, &metadata, Scope::All);

        let summary = inventory.scan().await.unwrap();
        let forms: Vec<(&str, SchemaForm)> = summary
            .collections
            .iter()
            .map(|c| (c.name.as_str(), c.schema_form))
            .collect();
        assert_eq!(
            forms,
            vec![
                ("A", SchemaForm::Legacy),
                ("B", SchemaForm::Current),
                ("C", SchemaForm::Legacy),
            ]
        );
        assert_eq!(summary.count(SchemaForm::Legacy), 2);
    }

    #[tokio::test]
    async fn managed_scope_ignores_foreign_collections() {
        let vector = MemoryVectorStore::new(vec![
            fixtures::legacy(&managed(D1), "cosine", 128, 32),
            fixtures::legacy("Foreign", "cosine", 128, 32),
        ]);
        let metadata = MemoryMetadataStore::default();
        let summary = Inventory::new(&vector, &metadata, Scope::Managed)
            .scan()
            .await
            .unwrap();
        assert_eq!(summary.total_in_store, 2);
        assert_eq!(summary.collections.len(), 1);
        assert_eq!(
            summary.collections[0].dataset_id,
            Some(DatasetId::new(D1))
        );
    }

    #[tokio::test]
    async fn definitions_without_class_are_counted_not_listed() {
        let vector = MemoryVectorStore::new(vec![json!({ "properties": [] }), fixtures::current("B")]);
        let metadata = MemoryMetadataStore::default();
        let summary = Inventory::new(&vector, &metadata, Scope::All)
            .scan()
            .await
            .unwrap();
        assert_eq!(summary.unnamed, 1);
        assert_eq!(summary.collections.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_is_an_empty_scan() {
        let vector = MemoryVectorStore::new(Vec::new());
        let metadata = MemoryMetadataStore::default();
        let summary = Inventory::new(&vector, &metadata, Scope::All)
            .scan()
            .await
            .unwrap();
        assert!(summary.collections.is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_is_an_error_not_an_empty_scan() {
        let vector = MemoryVectorStore::unreachable();
        let metadata = MemoryMetadataStore::default();
        let err = Inventory::new(&vector, &metadata, Scope::All)
            .scan()
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn orphans_are_the_set_difference() {
        let vector = MemoryVectorStore::new(vec![
            fixtures::current(&managed(D1)),
            fixtures::current(&managed(D3)),
        ]);
        let metadata =
            MemoryMetadataStore::with_datasets(&[(D1, "Handbook"), (D2, "Release notes")]);
        let inventory = Inventory::new(&vector, &metadata, Scope::All);

        let orphans = inventory.find_orphans().await.unwrap();
        let names: Vec<&str> = orphans.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![managed(D3).as_str()]);
        assert!(vector.mutations().is_empty());
        assert_eq!(vector.definitions().len(), 2);
    }

    #[tokio::test]
    async fn orphan_lookup_surfaces_metadata_failure() {
        let vector = MemoryVectorStore::new(vec![fixtures::current(&managed(D1))]);
        let metadata =
            MemoryMetadataStore::failing(MetadataError::Connectivity("refused".into()));
        let err = Inventory::new(&vector, &metadata, Scope::All)
            .find_orphans()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Metadata(MetadataError::Connectivity(_))));
    }

    #[tokio::test]
    async fn fetch_missing_collection_is_none() {
        let vector = MemoryVectorStore::new(Vec::new());
        let metadata = MemoryMetadataStore::default();
        let fetched = Inventory::new(&vector, &metadata, Scope::Managed)
            .fetch("Missing")
            .await
            .unwrap();
        assert!(fetched.is_none());
    }

    #[test]
    fn created_hint_is_read_from_auto_schema_description() {
        let descriptor =
            CollectionDescriptor::from_definition(fixtures::legacy("A", "cosine", 128, 32))
                .unwrap();
        assert_eq!(
            descriptor.created_hint.as_deref(),
            Some("Tue Mar 12 09:14:22 2024")
        );
        assert_eq!(descriptor.property_count, 2);
    }
}
