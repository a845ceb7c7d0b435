//! Orphan collections: listing with object counts, and operator-approved
//! removal.

use serde::Serialize;

use crate::error::EngineError;
use crate::inventory::{Inventory, Scope};
use crate::metadata::MetadataStore;
use crate::naming::DatasetId;
use crate::vector::{DeleteStatus, StoreError, VectorStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanCollection {
    pub name: String,
    pub dataset_id: DatasetId,
    /// `None` when the store could not count the collection's objects.
    pub object_count: Option<u64>,
}

/// Orphans in store order, each with its object count.
pub async fn list_orphans<V: VectorStore, M: MetadataStore>(
    vector: &V,
    metadata: &M,
    scope: Scope,
) -> Result<Vec<OrphanCollection>, EngineError> {
    let orphans = Inventory::new(vector, metadata, scope).find_orphans().await?;
    let mut result = Vec::with_capacity(orphans.len());
    for orphan in orphans {
        let Some(dataset_id) = orphan.dataset_id else {
            continue;
        };
        let object_count = match vector.object_count(&orphan.name).await {
            Ok(count) => Some(count),
            Err(e) if e.is_connectivity() => return Err(e.into()),
            Err(e) => {
                log::warn!("Could not count objects in '{}': {e}", orphan.name);
                None
            }
        };
        result.push(OrphanCollection {
            name: orphan.name,
            dataset_id,
            object_count,
        });
    }
    Ok(result)
}

#[derive(Debug, Default)]
pub struct CleanupRun {
    pub removed: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
    /// Set when the store became unreachable; later orphans were not tried.
    pub aborted: Option<EngineError>,
}

/// Delete the given orphans one at a time. Callers obtain confirmation first.
pub async fn remove_orphans<V: VectorStore>(vector: &V, orphans: &[OrphanCollection]) -> CleanupRun {
    let mut run = CleanupRun::default();
    for orphan in orphans {
        match vector.delete_collection(&orphan.name).await {
            Ok(status) => {
                if status == DeleteStatus::AlreadyAbsent {
                    log::info!("Orphan '{}' was already gone", orphan.name);
                } else {
                    log::info!("Deleted orphan '{}'", orphan.name);
                }
                run.removed.push(orphan.name.clone());
            }
            Err(e) if e.is_connectivity() => {
                run.aborted = Some(e.into());
                break;
            }
            Err(e) => {
                log::error!("Failed to delete orphan '{}': {e}", orphan.name);
                run.failed.push((orphan.name.clone(), e));
            }
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use crate::testutil::{MemoryMetadataStore, MemoryVectorStore, Mutation};

    const D1: &str = "11111111-1111-4111-8111-111111111111";
    const D3: &str = "33333333-3333-4333-8333-333333333333";

    fn store() -> MemoryVectorStore {
        let store = MemoryVectorStore::new(vec![
            fixtures::current(&DatasetId::new(D1).collection_name()),
            fixtures::legacy(&DatasetId::new(D3).collection_name(), "cosine", 128, 32),
        ]);
        store.set_object_count(&DatasetId::new(D3).collection_name(), 17);
        store
    }

    #[tokio::test]
    async fn lists_orphans_with_counts_without_deleting() {
        let vector = store();
        let metadata = MemoryMetadataStore::with_datasets(&[(D1, "Handbook")]);

        let orphans = list_orphans(&vector, &metadata, Scope::Managed).await.unwrap();
        assert_eq!(
            orphans,
            vec![OrphanCollection {
                name: DatasetId::new(D3).collection_name(),
                dataset_id: DatasetId::new(D3),
                object_count: Some(17),
            }]
        );
        assert!(vector.mutations().is_empty());
    }

    #[tokio::test]
    async fn removes_only_the_given_orphans() {
        let vector = store();
        let metadata = MemoryMetadataStore::with_datasets(&[(D1, "Handbook")]);
        let orphans = list_orphans(&vector, &metadata, Scope::Managed).await.unwrap();

        let run = remove_orphans(&vector, &orphans).await;
        assert_eq!(run.removed, vec![DatasetId::new(D3).collection_name()]);
        assert!(run.failed.is_empty());
        assert_eq!(
            vector.mutations(),
            vec![Mutation::Delete(DatasetId::new(D3).collection_name())]
        );
        assert!(vector.definition(&DatasetId::new(D1).collection_name()).is_some());
    }

    #[tokio::test]
    async fn rejected_delete_is_recorded_and_run_continues() {
        let vector = store();
        vector.fail_deletes_with(StoreError::Rejected {
            status: 500,
            message: "boom".into(),
        });
        let orphans = vec![
            OrphanCollection {
                name: "X".into(),
                dataset_id: DatasetId::new(D1),
                object_count: None,
            },
            OrphanCollection {
                name: "Y".into(),
                dataset_id: DatasetId::new(D3),
                object_count: None,
            },
        ];
        let run = remove_orphans(&vector, &orphans).await;
        assert_eq!(run.failed.len(), 2);
        assert!(run.aborted.is_none());
    }
}
