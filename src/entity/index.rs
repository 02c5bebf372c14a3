use crate::context::ExecutionContext;
use crate::core::{ArchivistError, Result, ValidationCode, ValidationError, Violation};
use crate::persistence::RawIndex;
use crate::transform::to_instance;
use crate::validation::Validate;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Level, event};

/// An index that passed validation, in typed and plain form.
#[derive(Debug, Clone)]
pub struct AssignedIndex<I> {
    pub typed: I,
    pub raw: RawIndex,
}

/// Copies the declared fields out of an index-shaped object.
///
/// Undeclared fields are dropped; declared fields that are missing stay missing
/// and are left to the validation rules.
pub fn project_index(fields: &[&str], raw: &RawIndex) -> RawIndex {
    fields
        .iter()
        .filter_map(|field| raw.get(*field).map(|value| (field.to_string(), value.clone())))
        .collect()
}

/// Projects, validates and types an index for `topic`.
pub async fn build_index<I>(
    ctx: &ExecutionContext,
    topic: &str,
    fields: &[&str],
    raw: &RawIndex,
) -> Result<AssignedIndex<I>>
where
    I: DeserializeOwned + Validate,
{
    let projected = project_index(fields, raw);
    let plain = Value::Object(projected.clone());

    let violations = ctx.validator().validate(&plain, &I::validation_schema()).await;
    if !violations.is_empty() {
        event!(
            Level::DEBUG,
            topic,
            violations = violations.len(),
            "index rejected"
        );
        return Err(ValidationError::new(
            ValidationCode::InvalidIndex,
            format!("Invalid index for topic '{}'", topic),
            violations,
        )
        .into());
    }

    let typed = to_instance::<I>(plain).map_err(|err| match err {
        ArchivistError::Transform { source, .. } => ArchivistError::Validation(ValidationError::new(
            ValidationCode::InvalidIndex,
            format!("Invalid index for topic '{}'", topic),
            vec![Violation::new("index", "type", source.to_string())],
        )),
        other => other,
    })?;

    Ok(AssignedIndex {
        typed,
        raw: projected,
    })
}
