//! Mapping between vector-store collection names and dataset identifiers.
//!
//! The host application names each dataset's collection
//! `Vector_index_<uuid>_Node`, with the UUID's hyphens written as underscores.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const COLLECTION_PREFIX: &str = "Vector_index_";
pub const COLLECTION_SUFFIX: &str = "_Node";

/// Identifier of a dataset row in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Wrap an identifier read from the metadata store. UUIDs are normalised to
    /// their lowercase hyphenated form so they compare equal to derived ids.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        match uuid::Uuid::try_parse(id.trim()) {
            Ok(parsed) => Self(parsed.hyphenated().to_string()),
            Err(_) => Self(id.trim().to_string()),
        }
    }

    /// Derive the dataset id from a collection name, or `None` if the name does
    /// not follow the host application's convention.
    pub fn from_collection_name(name: &str) -> Option<Self> {
        let inner = name
            .strip_prefix(COLLECTION_PREFIX)?
            .strip_suffix(COLLECTION_SUFFIX)?;
        let groups: Vec<&str> = inner.split('_').collect();
        if groups.len() < 5 {
            return None;
        }
        let candidate = groups[..5].join("-");
        uuid::Uuid::try_parse(&candidate)
            .ok()
            .map(|id| Self(id.hyphenated().to_string()))
    }

    /// The collection name the host application would use for this dataset.
    pub fn collection_name(&self) -> String {
        format!(
            "{COLLECTION_PREFIX}{}{COLLECTION_SUFFIX}",
            self.0.replace('-', "_")
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `name` is a collection managed by the host application.
pub fn is_managed_collection(name: &str) -> bool {
    DatasetId::from_collection_name(name).is_some()
}
