use crate::config::ArchivistConfig;
use crate::persistence::{Encoding, PersistenceAdapter};
use crate::validation::{SchemaValidator, ValidationAdapter};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Request-scoped handle bound to every entity and command invocation.
///
/// Cloning is cheap and shares the same adapters; entities keep a clone and
/// only ever read through it.
#[derive(Clone)]
pub struct ExecutionContext {
    archivist: Arc<dyn PersistenceAdapter>,
    validator: Arc<dyn ValidationAdapter>,
    config: Arc<ArchivistConfig>,
    request_id: Uuid,
    actor_id: Option<String>,
    started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Creates a context with a schema validator built from the config's policy.
    pub fn new(archivist: Arc<dyn PersistenceAdapter>, config: Arc<ArchivistConfig>) -> Self {
        let validator = Arc::new(SchemaValidator::new(config.validation.clone()));
        Self {
            archivist,
            validator,
            config,
            request_id: Uuid::new_v4(),
            actor_id: None,
            started_at: Utc::now(),
        }
    }

    /// Context with default configuration.
    pub fn with_archivist(archivist: Arc<dyn PersistenceAdapter>) -> Self {
        Self::new(archivist, Arc::new(ArchivistConfig::default()))
    }

    /// Replaces the validation adapter.
    pub fn with_validator(mut self, validator: Arc<dyn ValidationAdapter>) -> Self {
        self.validator = validator;
        self
    }

    /// Sets the actor ID.
    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Sets the request ID.
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn archivist(&self) -> &dyn PersistenceAdapter {
        self.archivist.as_ref()
    }

    pub fn validator(&self) -> &dyn ValidationAdapter {
        self.validator.as_ref()
    }

    pub fn config(&self) -> &ArchivistConfig {
        &self.config
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn default_media_type(&self) -> &str {
        &self.config.default_media_type
    }

    pub(crate) fn default_encoding(&self) -> Encoding {
        self.config.default_encoding
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.request_id)
            .field("actor_id", &self.actor_id)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
