pub mod http;

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

pub use http::HttpVectorStore;

/// Errors that can occur when calling the vector store's schema API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Store unreachable: DNS, refused connection, reset, or timeout.
    #[error("vector store unreachable: {0}")]
    Connectivity(String),
    /// The store answered with an error status.
    #[error("vector store rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// The store answered, but not with a document the engine understands.
    #[error("malformed response from vector store: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    /// The store had no such collection. Treated as success.
    AlreadyAbsent,
}

/// Trait abstracting the vector store's schema-management API.
///
/// Definitions are opaque JSON documents; interpretation lives in
/// [`crate::schema`].
pub trait VectorStore: Send + Sync {
    /// Succeeds only if the store reports itself ready to serve.
    fn ready(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every collection definition, in the order the store lists them.
    fn list_definitions(&self) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    /// One definition, or `None` if the store has no such collection.
    fn get_definition(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    fn delete_collection(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<DeleteStatus, StoreError>> + Send;

    fn create_collection(
        &self,
        definition: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Number of objects stored in a collection.
    fn object_count(&self, name: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
