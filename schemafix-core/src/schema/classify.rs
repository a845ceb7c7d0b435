use serde_json::{Map, Value};

use super::{
    SchemaForm, VECTOR_CONFIG, VECTOR_INDEX_CONFIG, VECTOR_INDEX_TYPE, VECTORIZER,
    VECTORIZER_NONE, class_name,
};

/// Classify a collection definition. Total: every input maps to exactly one
/// form, and anything not recognisably legacy or current is `Unknown`.
pub fn classify(definition: &Value) -> SchemaForm {
    let Some(fields) = definition.as_object() else {
        return SchemaForm::Unknown;
    };
    if class_name(definition).is_none() {
        return SchemaForm::Unknown;
    }

    match named_vectors(fields) {
        NamedVectors::Map(map) if map.values().any(is_complete_named_vector) => {
            SchemaForm::Current
        }
        NamedVectors::Map(_) | NamedVectors::Invalid => SchemaForm::Unknown,
        NamedVectors::Absent if is_legacy_index(fields) => SchemaForm::Legacy,
        NamedVectors::Absent => SchemaForm::Unknown,
    }
}

enum NamedVectors<'a> {
    Absent,
    Map(&'a Map<String, Value>),
    Invalid,
}

/// An absent, null or empty named-vector map all count as "no map".
fn named_vectors(fields: &Map<String, Value>) -> NamedVectors<'_> {
    match fields.get(VECTOR_CONFIG) {
        None | Some(Value::Null) => NamedVectors::Absent,
        Some(Value::Object(map)) if map.is_empty() => NamedVectors::Absent,
        Some(Value::Object(map)) => NamedVectors::Map(map),
        Some(_) => NamedVectors::Invalid,
    }
}

fn is_legacy_index(fields: &Map<String, Value>) -> bool {
    let has_index = fields
        .get(VECTOR_INDEX_CONFIG)
        .is_some_and(Value::is_object);
    has_index && vectorizer_is_external(fields.get(VECTORIZER))
}

/// Legacy definitions name their vectorizer with a plain string; only "none"
/// (or no vectorizer at all) means the vectors come from the client.
fn vectorizer_is_external(vectorizer: Option<&Value>) -> bool {
    match vectorizer {
        None | Some(Value::Null) => true,
        Some(Value::String(name)) => name == VECTORIZER_NONE,
        Some(_) => false,
    }
}

fn is_complete_named_vector(entry: &Value) -> bool {
    entry.get(VECTOR_INDEX_TYPE).is_some_and(Value::is_string)
        && entry.get(VECTOR_INDEX_CONFIG).is_some_and(Value::is_object)
        && entry.get(VECTORIZER).is_some_and(Value::is_object)
}
