use super::cast::TypeRegistry;
use super::pipeline::{ValidatedCommand, wrap_command};
use super::{CommandDescriptor, CommandHandler};
use crate::context::ExecutionContext;
use crate::core::{ArchivistError, Result};
use crate::crash::crash;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, event};

/// Every remote-invocable command of a service, registered explicitly at startup.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    types: TypeRegistry,
    commands: BTreeMap<String, ValidatedCommand>,
}

impl CommandRegistry {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            types,
            commands: BTreeMap::new(),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Wraps and registers a command. Misconfiguration is fatal.
    pub fn register(
        &mut self,
        descriptor: CommandDescriptor,
        handler: impl CommandHandler + 'static,
    ) -> Result<()> {
        if self.commands.contains_key(&descriptor.name) {
            return Err(crash(
                ArchivistError::CommandAlreadyRegistered(descriptor.name.clone()),
                json!({ "command": descriptor.name }),
            ));
        }

        let command = wrap_command(descriptor, Arc::new(handler), &self.types)?;
        event!(
            Level::DEBUG,
            command = command.name(),
            params = command.descriptor().params.len(),
            "command registered"
        );
        self.commands.insert(command.name().to_string(), command);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ValidatedCommand> {
        self.commands.get(name)
    }

    /// Roles an external authorization layer must check before `execute`.
    pub fn acl(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|command| command.descriptor().roles())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Invokes a registered command.
    pub async fn execute(&self, ctx: &ExecutionContext, name: &str, args: Vec<Value>) -> Result<Value> {
        let command = self
            .get(name)
            .ok_or_else(|| ArchivistError::UnknownCommand(name.to_string()))?;
        command.invoke(ctx, args).await
    }
}
