//! Plain value <-> typed instance conversion
//!
//! Typed instances are produced by deserializing plain JSON: declared field
//! types apply recursively and properties the target does not declare are
//! dropped.

use crate::core::{ArchivistError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Converts a plain value into an instance of `T`.
pub fn to_instance<T: DeserializeOwned>(raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|source| ArchivistError::Transform {
        target: std::any::type_name::<T>(),
        source,
    })
}

/// Converts a plain value into `T`, falling back to `T::default()` when there is none.
pub fn to_instance_or_default<T: DeserializeOwned + Default>(raw: Option<Value>) -> Result<T> {
    match raw {
        Some(value) => to_instance(value),
        None => Ok(T::default()),
    }
}

/// Produces the plain data view of an instance.
pub fn to_plain<T: Serialize + ?Sized>(instance: &T) -> Result<Value> {
    serde_json::to_value(instance).map_err(|source| ArchivistError::Transform {
        target: "plain value",
        source,
    })
}

/// JavaScript-style truthiness of a plain value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Stats {
        hp: u32,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Hero {
        name: String,
        stats: Stats,
    }

    #[test]
    fn test_nested_types_are_applied_and_unknown_fields_dropped() {
        let hero: Hero = to_instance(json!({
            "name": "Ann",
            "stats": {"hp": 10, "mana": 3},
            "index": {"playerId": "p1"}
        }))
        .unwrap();

        assert_eq!(hero.stats.hp, 10);
        assert_eq!(to_plain(&hero).unwrap(), json!({"name": "Ann", "stats": {"hp": 10, "tags": []}}));
    }

    #[test]
    fn test_type_mismatch_names_target() {
        let err = to_instance::<Hero>(json!({"name": 5, "stats": {"hp": 1}})).unwrap_err();
        match err {
            ArchivistError::Transform { target, .. } => assert!(target.ends_with("Hero")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_raw_value_defaults() {
        let hero: Hero = to_instance_or_default(None).unwrap();
        assert_eq!(hero, Hero::default());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
    }
}
