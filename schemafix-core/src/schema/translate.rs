use serde_json::{Map, Number, Value, json};
use thiserror::Error;

use super::{
    DEFAULT_VECTOR_NAME, SchemaForm, VECTOR_CONFIG, VECTOR_INDEX_CONFIG, VECTOR_INDEX_TYPE,
    VECTORIZER, VECTORIZER_NONE, classify,
};

/// Index config keys that must be present before a definition is translated.
pub const REQUIRED_TUNING_KEYS: [&str; 4] = ["distance", "ef", "efConstruction", "maxConnections"];

const DEFAULT_INDEX_TYPE: &str = "hnsw";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationError {
    #[error("definition is {0}; only legacy definitions can be translated")]
    NotLegacy(SchemaForm),
    #[error("vector index config is missing required tuning fields: {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },
}

/// The vector-index portion of a collection definition.
///
/// `tuning` is the store's index config object carried verbatim, so optional
/// parameters the engine does not interpret survive translation unchanged.
/// The vectorizer is always "none": embeddings are supplied by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexSpec {
    pub index_type: String,
    pub distance_metric: String,
    pub ef_construction: Number,
    pub max_connections: Number,
    pub ef_search: Number,
    pub tuning: Map<String, Value>,
}

impl VectorIndexSpec {
    /// Extract the index spec from the top level of a legacy definition.
    pub fn from_legacy(definition: &Value) -> Result<Self, TranslationError> {
        let tuning = definition
            .get(VECTOR_INDEX_CONFIG)
            .and_then(Value::as_object)
            .ok_or(TranslationError::Incomplete {
                missing: REQUIRED_TUNING_KEYS.to_vec(),
            })?;
        let index_type = definition
            .get(VECTOR_INDEX_TYPE)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_INDEX_TYPE);
        Self::from_parts(index_type, tuning)
    }

    /// Extract the spec of the `default` named vector of a current definition.
    pub fn from_current(definition: &Value) -> Option<Self> {
        let entry = definition.get(VECTOR_CONFIG)?.get(DEFAULT_VECTOR_NAME)?;
        let index_type = entry.get(VECTOR_INDEX_TYPE)?.as_str()?;
        let tuning = entry.get(VECTOR_INDEX_CONFIG)?.as_object()?;
        Self::from_parts(index_type, tuning).ok()
    }

    fn from_parts(index_type: &str, tuning: &Map<String, Value>) -> Result<Self, TranslationError> {
        let missing: Vec<&'static str> = REQUIRED_TUNING_KEYS
            .iter()
            .copied()
            .filter(|key| match (*key, tuning.get(*key)) {
                ("distance", Some(Value::String(_))) => false,
                (_, Some(Value::Number(_))) => *key == "distance",
                _ => true,
            })
            .collect();
        if !missing.is_empty() {
            return Err(TranslationError::Incomplete { missing });
        }

        let number = |key: &str| match tuning.get(key) {
            Some(Value::Number(n)) => n.clone(),
            _ => Number::from(0),
        };
        Ok(Self {
            index_type: index_type.to_string(),
            distance_metric: tuning
                .get("distance")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ef_construction: number("efConstruction"),
            max_connections: number("maxConnections"),
            ef_search: number("ef"),
            tuning: tuning.clone(),
        })
    }

    /// Render as one entry of the named-vector map.
    pub fn to_named_vector(&self) -> Value {
        json!({
            VECTOR_INDEX_TYPE: self.index_type,
            VECTOR_INDEX_CONFIG: Value::Object(self.tuning.clone()),
            VECTORIZER: { VECTORIZER_NONE: {} },
        })
    }
}

/// Rewrite a legacy definition into the current named-vector form.
///
/// Every field other than the top-level index type, index config and
/// vectorizer is copied unchanged. Nothing is produced unless all required
/// tuning fields are present.
pub fn translate(definition: &Value) -> Result<Value, TranslationError> {
    let form = classify(definition);
    if form != SchemaForm::Legacy {
        return Err(TranslationError::NotLegacy(form));
    }
    let Some(fields) = definition.as_object() else {
        return Err(TranslationError::NotLegacy(SchemaForm::Unknown));
    };
    let spec = VectorIndexSpec::from_legacy(definition)?;

    let mut translated = fields.clone();
    translated.remove(VECTOR_INDEX_TYPE);
    translated.remove(VECTOR_INDEX_CONFIG);
    translated.remove(VECTORIZER);
    translated.insert(
        VECTOR_CONFIG.to_string(),
        json!({ DEFAULT_VECTOR_NAME: spec.to_named_vector() }),
    );
    Ok(Value::Object(translated))
}
