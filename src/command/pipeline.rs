use super::cast::{CastArgs, CastValue, DeclaredType, TypeRegistry};
use super::{CommandDescriptor, CommandHandler, ENTRY_METHOD};
use crate::context::ExecutionContext;
use crate::core::{ArchivistError, Result, ValidationCode, ValidationError, Violation};
use crate::crash::crash;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone)]
struct ResolvedParam {
    name: String,
    declared: DeclaredType,
}

/// A command body wrapped with argument casting and input/output validation.
#[derive(Clone)]
pub struct ValidatedCommand {
    descriptor: Arc<CommandDescriptor>,
    params: Arc<[ResolvedParam]>,
    handler: Arc<dyn CommandHandler>,
}

/// Wraps `handler` with the validation pipeline described by `descriptor`.
///
/// Fails (fatally) when an ACL is attached to anything but the entry method or
/// when a parameter type is not registered.
pub fn wrap_command(
    descriptor: CommandDescriptor,
    handler: Arc<dyn CommandHandler>,
    types: &TypeRegistry,
) -> Result<ValidatedCommand> {
    if let Some(misplaced) = descriptor
        .annotations
        .iter()
        .find(|annotation| annotation.method != ENTRY_METHOD)
    {
        return Err(crash(
            ArchivistError::AclOnNonEntryMethod {
                command: descriptor.name.clone(),
                method: misplaced.method.clone(),
                entry: ENTRY_METHOD,
            },
            json!({ "command": descriptor.name, "method": misplaced.method, "acl": misplaced.roles }),
        ));
    }

    let mut params = Vec::with_capacity(descriptor.params.len());
    for spec in &descriptor.params {
        let Some(declared) = types.resolve(&spec.type_name) else {
            return Err(crash(
                ArchivistError::UnknownParameterType {
                    command: descriptor.name.clone(),
                    param: spec.name.clone(),
                    type_name: spec.type_name.clone(),
                },
                json!({ "command": descriptor.name, "param": spec.name, "type": spec.type_name }),
            ));
        };
        params.push(ResolvedParam {
            name: spec.name.clone(),
            declared: declared.clone(),
        });
    }

    Ok(ValidatedCommand {
        descriptor: Arc::new(descriptor),
        params: params.into(),
        handler,
    })
}

impl ValidatedCommand {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    /// Runs the full pipeline for one call. `args` excludes the context.
    pub async fn invoke(&self, ctx: &ExecutionContext, args: Vec<Value>) -> Result<Value> {
        let span = info_span!(
            "command.invoke",
            command = %self.descriptor.name,
            request_id = %ctx.request_id()
        );
        self.run(ctx, args).instrument(span).await
    }

    async fn run(&self, ctx: &ExecutionContext, args: Vec<Value>) -> Result<Value> {
        if args.len() > self.params.len() {
            event!(
                Level::WARN,
                received = args.len(),
                declared = self.params.len(),
                "surplus command arguments ignored"
            );
        }

        let (casted, holder) = self.cast_arguments(ctx, args).await?;

        let violations = ctx
            .validator()
            .validate(&Value::Object(holder), &self.descriptor.input)
            .await;
        if !violations.is_empty() {
            event!(Level::DEBUG, violations = violations.len(), "command input rejected");
            return Err(ValidationError::new(
                ValidationCode::InvalidUserCommandInput,
                format!("Invalid input for command '{}'", self.descriptor.name),
                violations,
            )
            .into());
        }

        let result = self.handler.execute(ctx.clone(), casted).await?;

        let violations = self.validate_result(ctx, &result).await;
        if !violations.is_empty() {
            event!(Level::WARN, violations = violations.len(), "command result rejected");
            return Err(ValidationError::new(
                ValidationCode::InvalidUserCommandReturnValue,
                format!("Invalid return value from command '{}'", self.descriptor.name),
                violations,
            )
            .into());
        }

        Ok(result)
    }

    /// Casts all arguments concurrently.
    ///
    /// Results are slotted back by position, and the holder gets one named
    /// field per parameter. Every cast runs to completion; the first failure
    /// to complete is returned.
    async fn cast_arguments(
        &self,
        ctx: &ExecutionContext,
        mut args: Vec<Value>,
    ) -> Result<(CastArgs, Map<String, Value>)> {
        args.resize(self.params.len().max(args.len()), Value::Null);

        let mut pending: FuturesUnordered<_> = self
            .params
            .iter()
            .zip(args)
            .enumerate()
            .map(|(position, (param, raw))| async move {
                (position, param.declared.cast(ctx, raw).await)
            })
            .collect();

        let mut slots: Vec<Option<CastValue>> = self.params.iter().map(|_| None).collect();
        let mut holder = Map::new();
        let mut first_error = None;

        while let Some((position, result)) = pending.next().await {
            match result {
                Ok(value) => {
                    holder.insert(self.params[position].name.clone(), value.view().clone());
                    slots[position] = Some(value);
                }
                Err(err) => {
                    if first_error.is_none() {
                        event!(
                            Level::DEBUG,
                            param = %self.params[position].name,
                            error = %err,
                            "argument cast failed"
                        );
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        Ok((CastArgs::new(slots.into_iter().flatten().collect()), holder))
    }

    /// Objects are validated against the output rules, arrays item by item;
    /// primitives pass through.
    async fn validate_result(&self, ctx: &ExecutionContext, result: &Value) -> Vec<Violation> {
        match result {
            Value::Object(_) => ctx.validator().validate(result, &self.descriptor.output).await,
            Value::Array(items) => {
                let mut violations = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        continue;
                    }
                    for mut violation in ctx.validator().validate(item, &self.descriptor.output).await {
                        violation.property = if violation.property.is_empty() {
                            format!("[{}]", i)
                        } else {
                            format!("[{}].{}", i, violation.property)
                        };
                        violations.push(violation);
                    }
                }
                violations
            }
            _ => Vec::new(),
        }
    }
}
