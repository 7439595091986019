//! Value schema compatibility checking.
//!
//! The Avro compatibility rules themselves are out of scope -- versioned
//! record types are consumed by name, not parsed as Avro. This module is
//! the seam where a real Avro-aware checker would plug in; the default
//! implementation applies the same
//! directional rule at a JSON-structural level: a candidate schema is
//! compatible with an existing one if it does not drop or retype an
//! existing field.

use serde_json::Value;

/// Pluggable schema compatibility rule.
pub trait SchemaCompatibilityChecker: Send + Sync {
    /// `true` if `candidate` may be registered as a new schema version
    /// alongside `existing` without breaking readers on `existing`.
    fn is_compatible(&self, existing: &str, candidate: &str) -> bool;
}

/// Default checker: record schemas must not drop or retype a field
/// relative to any existing record schema; primitive schemas must match
/// exactly; a transition between a primitive and a record shape is always
/// treated as a compatible upgrade (there is no existing record-shaped
/// reader state to break).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCompatibilityChecker;

impl SchemaCompatibilityChecker for DefaultCompatibilityChecker {
    fn is_compatible(&self, existing: &str, candidate: &str) -> bool {
        if existing == candidate {
            return true;
        }

        let existing_json: Option<Value> = serde_json::from_str(existing).ok();
        let candidate_json: Option<Value> = serde_json::from_str(candidate).ok();

        match (existing_json, candidate_json) {
            (Some(Value::Object(e)), Some(Value::Object(c)))
                if e.contains_key("fields") && c.contains_key("fields") =>
            {
                record_fields_compatible(&e, &c)
            }
            (Some(Value::Object(_)), Some(_)) | (Some(_), Some(Value::Object(_))) => true,
            (Some(e), Some(c)) => e == c,
            _ => existing == candidate,
        }
    }
}

fn record_fields_compatible(
    existing: &serde_json::Map<String, Value>,
    candidate: &serde_json::Map<String, Value>,
) -> bool {
    let existing_fields = existing.get("fields").and_then(Value::as_array);
    let candidate_fields = candidate.get("fields").and_then(Value::as_array);

    let (Some(existing_fields), Some(candidate_fields)) = (existing_fields, candidate_fields)
    else {
        return false;
    };

    for ef in existing_fields {
        let name = ef.get("name").and_then(Value::as_str);
        let ty = ef.get("type");

        let matching = candidate_fields
            .iter()
            .find(|cf| cf.get("name").and_then(Value::as_str) == name);

        match matching {
            None => return false, // dropped a field
            Some(cf) => {
                if cf.get("type") != ty {
                    return false; // retyped a field
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_primitive_schemas_are_compatible() {
        let checker = DefaultCompatibilityChecker;
        assert!(checker.is_compatible("\"string\"", "\"string\""));
    }

    #[test]
    fn differing_primitive_schemas_are_incompatible() {
        let checker = DefaultCompatibilityChecker;
        assert!(!checker.is_compatible("\"string\"", "\"int\""));
    }

    #[test]
    fn primitive_to_record_transition_is_compatible() {
        let checker = DefaultCompatibilityChecker;
        let record = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"}]}"#;
        assert!(checker.is_compatible("\"string\"", record));
    }

    #[test]
    fn record_adding_field_is_compatible() {
        let checker = DefaultCompatibilityChecker;
        let v1 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"}]}"#;
        let v2 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"},{"name":"b","type":"int"}]}"#;
        assert!(checker.is_compatible(v1, v2));
    }

    #[test]
    fn record_dropping_field_is_incompatible() {
        let checker = DefaultCompatibilityChecker;
        let v1 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"},{"name":"b","type":"int"}]}"#;
        let v2 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"}]}"#;
        assert!(!checker.is_compatible(v1, v2));
    }

    #[test]
    fn record_retyping_field_is_incompatible() {
        let checker = DefaultCompatibilityChecker;
        let v1 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"}]}"#;
        let v2 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        assert!(!checker.is_compatible(v1, v2));
    }
}
