// ============================================================================
// Archivist Library
// ============================================================================
//
// Typed entities on top of a key/value persistence adapter, and a validated
// pipeline for remote command invocations.

pub mod command;
pub mod config;
pub mod context;
pub mod core;
pub mod crash;
pub mod entity;
pub mod persistence;
pub mod transform;
pub mod validation;

// Re-export main types for convenience
pub use command::{
    CastArgs, CastValue, CommandDescriptor, CommandHandler, CommandRegistry, DeclaredType,
    EntityHydrator, ParamSpec, TypeRegistry, ValidatedCommand, wrap_command,
};
pub use config::{ArchivistConfig, ValidationPolicy, VaultRouteConfig};
pub use context::ExecutionContext;
pub use core::{
    AdapterError, AdapterResult, ArchivistError, ErrorClass, Result, ValidationCode,
    ValidationError, Violation,
};
pub use crash::{Severity, crash};
pub use entity::{Entity, QueryOptions, Topic, TopicDescriptor, TopicRegistry};
pub use persistence::{
    Encoding, Expiration, GetOptions, InMemoryVault, ListOptions, PersistenceAdapter, Promisified,
    Query, RawIndex, Record, VaultRouter, raw_index,
};
pub use validation::{
    Constraint, FieldRule, ObjectCheck, SchemaValidator, Validate, ValidationAdapter,
    ValidationSchema,
};
