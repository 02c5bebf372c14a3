//! Validated remote command execution
//!
//! A command is described explicitly by a [`CommandDescriptor`] (name,
//! ordered parameters with declared type names, ACL, input and output rules)
//! and paired with a [`CommandHandler`]. Wrapping the pair produces a
//! [`ValidatedCommand`] whose `invoke`:
//!
//! 1. casts every raw argument concurrently (entity types are hydrated,
//!    everything else is transformed), keeping positional order;
//! 2. validates the named arguments together (`InvalidUserCommandInput`);
//! 3. runs the handler;
//! 4. validates structural results (`InvalidUserCommandReturnValue`).

mod cast;
mod pipeline;
mod registry;

pub use cast::{CastArgs, CastValue, DeclaredType, EntityHydrator, TypeRegistry};
pub use pipeline::{ValidatedCommand, wrap_command};
pub use registry::CommandRegistry;

use crate::context::ExecutionContext;
use crate::core::Result;
use crate::validation::ValidationSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// The only method an ACL may be attached to.
pub const ENTRY_METHOD: &str = "execute";

/// A declared command parameter (the execution context is implicit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    /// Name resolved through the `TypeRegistry`.
    pub type_name: String,
}

/// Roles attached to one method of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclAnnotation {
    pub method: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub annotations: Vec<AclAnnotation>,
    /// Rules for the named arguments, checked together after casting.
    pub input: ValidationSchema,
    /// Rules for object results.
    pub output: ValidationSchema,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            annotations: Vec::new(),
            input: ValidationSchema::new(),
            output: ValidationSchema::new(),
        }
    }

    /// Appends a parameter.
    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    /// Attaches roles to the entry method.
    pub fn acl(self, roles: &[&str]) -> Self {
        self.annotate(ENTRY_METHOD, roles)
    }

    /// Attaches roles to a named method. Anything but the entry method is
    /// rejected when the command is registered.
    pub fn annotate(mut self, method: impl Into<String>, roles: &[&str]) -> Self {
        self.annotations.push(AclAnnotation {
            method: method.into(),
            roles: roles.iter().map(|role| role.to_string()).collect(),
        });
        self
    }

    pub fn input(mut self, schema: ValidationSchema) -> Self {
        self.input = schema;
        self
    }

    pub fn output(mut self, schema: ValidationSchema) -> Self {
        self.output = schema;
        self
    }

    /// Roles on the entry method.
    pub fn roles(&self) -> Vec<String> {
        self.annotations
            .iter()
            .filter(|annotation| annotation.method == ENTRY_METHOD)
            .flat_map(|annotation| annotation.roles.iter().cloned())
            .collect()
    }
}

/// Body of a command. Receives the context and the casted arguments in order.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext, args: CastArgs) -> Result<Value>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(ExecutionContext, CastArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn execute(&self, ctx: ExecutionContext, args: CastArgs) -> Result<Value> {
        (self)(ctx, args).await
    }
}
