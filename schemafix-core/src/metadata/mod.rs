pub mod postgres;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use thiserror::Error;

use crate::naming::DatasetId;

pub use postgres::PgMetadataStore;

/// Errors from the relational metadata store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    /// Database unreachable, or no connection became available in time.
    #[error("metadata store unreachable: {0}")]
    Connectivity(String),
    /// The database answered with an error.
    #[error("metadata query failed: {0}")]
    Query(String),
}

impl MetadataError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// Read-only view of the host application's dataset table.
pub trait MetadataStore: Send + Sync {
    /// Every dataset id that has a metadata row.
    fn list_dataset_ids(
        &self,
    ) -> impl Future<Output = Result<BTreeSet<DatasetId>, MetadataError>> + Send;

    /// Display names for the given ids. Ids without a row are absent from
    /// the returned map.
    fn dataset_names(
        &self,
        ids: &[DatasetId],
    ) -> impl Future<Output = Result<HashMap<DatasetId, String>, MetadataError>> + Send;

    /// Number of document segments recorded for a dataset.
    fn segment_count(
        &self,
        id: &DatasetId,
    ) -> impl Future<Output = Result<u64, MetadataError>> + Send;
}
