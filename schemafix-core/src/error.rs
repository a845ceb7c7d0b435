use thiserror::Error;

use crate::config::ConfigError;
use crate::journal::JournalError;
use crate::metadata::MetadataError;
use crate::vector::StoreError;

/// Errors that end a command. Per-collection problems are recorded as
/// outcomes instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    VectorStore(#[from] StoreError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("collection '{0}' not found in the vector store")]
    NotFound(String),
}
