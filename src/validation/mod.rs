//! Structural validation
//!
//! - `schema.rs` - declarative rules (`ValidationSchema`, `FieldRule`, `Constraint`)
//! - `SchemaValidator` - the default `ValidationAdapter`, evaluating a schema
//!   against the plain view of an instance

mod schema;

pub use schema::{Constraint, FieldRule, ObjectCheck, ValidationSchema};

use crate::config::ValidationPolicy;
use crate::core::{Result, Violation};
use crate::transform::to_plain;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Types that declare validation rules for their plain view.
pub trait Validate {
    fn validation_schema() -> ValidationSchema;
}

/// Validation engine used by entities and commands.
///
/// An empty list means the instance is valid.
#[async_trait]
pub trait ValidationAdapter: Send + Sync {
    async fn validate(&self, instance: &Value, schema: &ValidationSchema) -> Vec<Violation>;
}

/// Evaluates `ValidationSchema`s under a fixed policy.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    policy: ValidationPolicy,
}

impl SchemaValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }
}

#[async_trait]
impl ValidationAdapter for SchemaValidator {
    async fn validate(&self, instance: &Value, schema: &ValidationSchema) -> Vec<Violation> {
        schema.validate_value(instance, &self.policy)
    }
}

/// Validates a typed instance against its own declared rules.
///
/// ```
/// use archivist::validation::{
///     FieldRule, SchemaValidator, Validate, ValidationSchema, validate_instance,
/// };
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Guild {
///     name: String,
/// }
///
/// impl Validate for Guild {
///     fn validation_schema() -> ValidationSchema {
///         ValidationSchema::new().field(FieldRule::new("name").min_length(3))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let guild = Guild { name: "K".to_string() };
/// let violations = validate_instance(&SchemaValidator::default(), &guild)
///     .await
///     .unwrap();
/// assert_eq!(violations[0].constraint, "minLength");
/// # });
/// ```
pub async fn validate_instance<T>(adapter: &dyn ValidationAdapter, instance: &T) -> Result<Vec<Violation>>
where
    T: Serialize + Validate,
{
    let plain = to_plain(instance)?;
    Ok(adapter.validate(&plain, &T::validation_schema()).await)
}
