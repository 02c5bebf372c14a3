//! Declarative validation rules
//!
//! A `ValidationSchema` describes the shape a JSON object must have: an ordered
//! list of per-field rules and a list of object-level checks that may look at
//! several fields at once. Rules are evaluated against the plain (serialized)
//! view of an instance, so the same schema works for entity data, entity
//! indexes, command inputs and command results.

use crate::config::ValidationPolicy;
use crate::core::Violation;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A single constraint applied to one field value.
#[derive(Debug, Clone)]
pub enum Constraint {
    Defined,
    IsString,
    IsInteger,
    IsNumber,
    IsBoolean,
    IsArray,
    IsObject,
    NotEmpty,
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Matches(Regex),
    OneOf(Vec<Value>),
    Nested(ValidationSchema),
    Each(Box<Constraint>),
}

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Defined => "isDefined",
            Self::IsString => "isString",
            Self::IsInteger => "isInt",
            Self::IsNumber => "isNumber",
            Self::IsBoolean => "isBoolean",
            Self::IsArray => "isArray",
            Self::IsObject => "isObject",
            Self::NotEmpty => "isNotEmpty",
            Self::MinLength(_) => "minLength",
            Self::MaxLength(_) => "maxLength",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::Matches(_) => "matches",
            Self::OneOf(_) => "isIn",
            Self::Nested(_) => "nested",
            Self::Each(_) => "each",
        }
    }

    fn check(&self, path: &str, value: &Value, policy: &ValidationPolicy, out: &mut Vec<Violation>) {
        let failed = |message: String| {
            Violation::new(path, self.name(), message).with_value(value.clone())
        };

        match self {
            Self::Defined => {
                if value.is_null() {
                    out.push(Violation::new(
                        path,
                        self.name(),
                        format!("{} should not be null or undefined", path),
                    ));
                }
            }
            Self::IsString => {
                if !value.is_string() {
                    out.push(failed(format!("{} must be a string", path)));
                }
            }
            Self::IsInteger => {
                if !(value.is_i64() || value.is_u64()) {
                    out.push(failed(format!("{} must be an integer number", path)));
                }
            }
            Self::IsNumber => {
                if !value.is_number() {
                    out.push(failed(format!("{} must be a number", path)));
                }
            }
            Self::IsBoolean => {
                if !value.is_boolean() {
                    out.push(failed(format!("{} must be a boolean value", path)));
                }
            }
            Self::IsArray => {
                if !value.is_array() {
                    out.push(failed(format!("{} must be an array", path)));
                }
            }
            Self::IsObject => {
                if !value.is_object() {
                    out.push(failed(format!("{} must be an object", path)));
                }
            }
            Self::NotEmpty => {
                let empty = match value {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    Value::Array(items) => items.is_empty(),
                    Value::Object(map) => map.is_empty(),
                    _ => false,
                };
                if empty {
                    out.push(failed(format!("{} should not be empty", path)));
                }
            }
            Self::MinLength(min) => match length_of(value) {
                Some(len) if len >= *min => {}
                Some(_) => out.push(failed(format!(
                    "{} must be longer than or equal to {} characters",
                    path, min
                ))),
                None => out.push(failed(format!("{} must have a length", path))),
            },
            Self::MaxLength(max) => match length_of(value) {
                Some(len) if len <= *max => {}
                Some(_) => out.push(failed(format!(
                    "{} must be shorter than or equal to {} characters",
                    path, max
                ))),
                None => out.push(failed(format!("{} must have a length", path))),
            },
            Self::Min(min) => match value.as_f64() {
                Some(n) if n >= *min => {}
                _ => out.push(failed(format!("{} must not be less than {}", path, min))),
            },
            Self::Max(max) => match value.as_f64() {
                Some(n) if n <= *max => {}
                _ => out.push(failed(format!("{} must not be greater than {}", path, max))),
            },
            Self::Matches(pattern) => match value.as_str() {
                Some(s) if pattern.is_match(s) => {}
                _ => out.push(failed(format!(
                    "{} must match {} regular expression",
                    path,
                    pattern.as_str()
                ))),
            },
            Self::OneOf(allowed) => {
                if !allowed.contains(value) {
                    out.push(failed(format!(
                        "{} must be one of the following values: {}",
                        path,
                        allowed
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }
            }
            Self::Nested(schema) => match value {
                Value::Object(map) => schema.check_object(path, map, policy, out),
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}[{}]", path, i);
                        match item {
                            Value::Object(map) => schema.check_object(&item_path, map, policy, out),
                            other => out.push(
                                Violation::new(
                                    &item_path,
                                    self.name(),
                                    format!("nested property {} must be an object", item_path),
                                )
                                .with_value(other.clone()),
                            ),
                        }
                    }
                }
                _ => out.push(failed(format!(
                    "nested property {} must be either object or array",
                    path
                ))),
            },
            Self::Each(inner) => match value {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        inner.check(&format!("{}[{}]", path, i), item, policy, out);
                    }
                }
                _ => out.push(failed(format!("{} must be an array", path))),
            },
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Rules for one named field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    /// Absent or null values skip every other constraint.
    pub optional: bool,
    pub constraints: Vec<Constraint>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            optional: false,
            constraints: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn defined(self) -> Self {
        self.constraint(Constraint::Defined)
    }

    pub fn is_string(self) -> Self {
        self.constraint(Constraint::IsString)
    }

    pub fn is_integer(self) -> Self {
        self.constraint(Constraint::IsInteger)
    }

    pub fn is_number(self) -> Self {
        self.constraint(Constraint::IsNumber)
    }

    pub fn is_boolean(self) -> Self {
        self.constraint(Constraint::IsBoolean)
    }

    pub fn is_array(self) -> Self {
        self.constraint(Constraint::IsArray)
    }

    pub fn is_object(self) -> Self {
        self.constraint(Constraint::IsObject)
    }

    pub fn not_empty(self) -> Self {
        self.constraint(Constraint::NotEmpty)
    }

    pub fn min_length(self, min: usize) -> Self {
        self.constraint(Constraint::MinLength(min))
    }

    pub fn max_length(self, max: usize) -> Self {
        self.constraint(Constraint::MaxLength(max))
    }

    pub fn min(self, min: f64) -> Self {
        self.constraint(Constraint::Min(min))
    }

    pub fn max(self, max: f64) -> Self {
        self.constraint(Constraint::Max(max))
    }

    pub fn matches(self, pattern: Regex) -> Self {
        self.constraint(Constraint::Matches(pattern))
    }

    pub fn one_of(self, allowed: Vec<Value>) -> Self {
        self.constraint(Constraint::OneOf(allowed))
    }

    pub fn nested(self, schema: ValidationSchema) -> Self {
        self.constraint(Constraint::Nested(schema))
    }

    pub fn each(self, constraint: Constraint) -> Self {
        self.constraint(Constraint::Each(Box::new(constraint)))
    }
}

type ObjectCheckFn = dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync;

/// Object-level check spanning several fields.
///
/// The closure returns `Some(message)` when the object is rejected.
#[derive(Clone)]
pub struct ObjectCheck {
    pub name: String,
    /// Property the violation is reported against.
    pub property: String,
    check: Arc<ObjectCheckFn>,
}

impl ObjectCheck {
    pub fn new<F>(name: impl Into<String>, property: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            property: property.into(),
            check: Arc::new(check),
        }
    }
}

impl fmt::Debug for ObjectCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCheck")
            .field("name", &self.name)
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

/// Ordered field rules plus object-level checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    pub fields: Vec<FieldRule>,
    pub checks: Vec<ObjectCheck>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn check(mut self, check: ObjectCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.checks.is_empty()
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|rule| rule.field == field)
    }

    /// Runs every rule against `value`, which must be a JSON object.
    pub fn validate_value(&self, value: &Value, policy: &ValidationPolicy) -> Vec<Violation> {
        let mut out = Vec::new();
        match value {
            Value::Object(map) => self.check_object("", map, policy, &mut out),
            other => out.push(
                Violation::new("", "isObject", "validated value must be an object")
                    .with_value(other.clone()),
            ),
        }

        if policy.stop_at_first_error {
            out.truncate(1);
        }
        out
    }

    fn check_object(
        &self,
        prefix: &str,
        map: &Map<String, Value>,
        policy: &ValidationPolicy,
        out: &mut Vec<Violation>,
    ) {
        for rule in &self.fields {
            let path = join_path(prefix, &rule.field);
            let value = map.get(&rule.field).unwrap_or(&Value::Null);
            if rule.optional && value.is_null() {
                continue;
            }
            for constraint in &rule.constraints {
                constraint.check(&path, value, policy, out);
            }
        }

        if !policy.allow_extra_fields {
            for key in map.keys() {
                if !self.declares(key) {
                    let path = join_path(prefix, key);
                    out.push(Violation::new(
                        &path,
                        "whitelistValidation",
                        format!("property {} should not exist", path),
                    ));
                }
            }
        }

        for check in &self.checks {
            if let Some(message) = (check.check)(map) {
                out.push(Violation::new(
                    join_path(prefix, &check.property),
                    check.name.clone(),
                    message,
                ));
            }
        }
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}
