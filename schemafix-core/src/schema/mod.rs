//! Collection definition documents: classification and legacy-to-current
//! translation.
//!
//! A definition is kept as an opaque `serde_json::Value`; only the fields that
//! govern vector indexing are interpreted here.

mod classify;
mod translate;

pub use classify::classify;
pub use translate::{REQUIRED_TUNING_KEYS, TranslationError, VectorIndexSpec, translate};

use serde::{Deserialize, Serialize};

pub(crate) const CLASS: &str = "class";
pub(crate) const PROPERTIES: &str = "properties";
pub(crate) const VECTOR_CONFIG: &str = "vectorConfig";
pub(crate) const VECTOR_INDEX_TYPE: &str = "vectorIndexType";
pub(crate) const VECTOR_INDEX_CONFIG: &str = "vectorIndexConfig";
pub(crate) const VECTORIZER: &str = "vectorizer";

/// Name of the single named vector written by the translator.
pub const DEFAULT_VECTOR_NAME: &str = "default";
/// Vectorizer value meaning "embeddings are supplied by the client".
pub const VECTORIZER_NONE: &str = "none";

/// Schema convention a collection definition follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaForm {
    /// Un-nested, single implicit vector index.
    Legacy,
    /// Named-vector configuration map.
    Current,
    /// Anything the engine will not touch automatically.
    Unknown,
}

impl SchemaForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Current => "current",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SchemaForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class name of a definition, if it has one.
pub fn class_name(definition: &serde_json::Value) -> Option<&str> {
    definition
        .get(CLASS)
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.is_empty())
}
