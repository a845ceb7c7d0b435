//! Object count vs. segment count, to tell whether re-embedding finished.

use serde::Serialize;

use crate::error::EngineError;
use crate::inventory::CollectionDescriptor;
use crate::metadata::MetadataStore;
use crate::naming::DatasetId;
use crate::report::NameLookup;
use crate::vector::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Complete,
    /// Fewer objects than segments: re-embedding has not finished.
    Pending,
    /// More objects than segments.
    Excess,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Pending => "pending",
            Self::Excess => "excess",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountComparison {
    pub collection_name: String,
    pub dataset_id: DatasetId,
    pub dataset_name: Option<String>,
    pub objects: u64,
    pub segments: u64,
}

impl CountComparison {
    pub fn status(&self) -> CountStatus {
        match self.objects.cmp(&self.segments) {
            std::cmp::Ordering::Equal => CountStatus::Complete,
            std::cmp::Ordering::Less => CountStatus::Pending,
            std::cmp::Ordering::Greater => CountStatus::Excess,
        }
    }
}

/// Compare counts for every collection that maps to a dataset. Collections
/// with non-conforming names are ignored.
pub async fn compare_counts<V: VectorStore, M: MetadataStore>(
    vector: &V,
    metadata: &M,
    collections: &[CollectionDescriptor],
) -> Result<Vec<CountComparison>, EngineError> {
    let targets: Vec<(&CollectionDescriptor, DatasetId)> = collections
        .iter()
        .filter_map(|c| c.dataset_id.clone().map(|id| (c, id)))
        .collect();
    let ids: Vec<DatasetId> = targets.iter().map(|(_, id)| id.clone()).collect();
    let names = NameLookup::resolve(metadata, &ids).await;

    let mut result = Vec::with_capacity(targets.len());
    for (collection, dataset_id) in targets {
        let objects = vector.object_count(&collection.name).await?;
        let segments = metadata.segment_count(&dataset_id).await?;
        log::debug!(
            "{}: {objects} objects, {segments} segments",
            collection.name
        );
        result.push(CountComparison {
            collection_name: collection.name.clone(),
            dataset_name: names.name(&dataset_id).map(str::to_string),
            dataset_id,
            objects,
            segments,
        });
    }
    Ok(result)
}
