use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single field-level constraint failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path of the offending property (`address.city`, `tags[2]`).
    pub property: String,
    /// Machine name of the failed constraint (`minLength`, `isString`, ...).
    pub constraint: String,
    /// Human readable description.
    pub message: String,
    /// The value that failed the check, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Violation {
    pub fn new(
        property: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            constraint: constraint.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.property, self.constraint, self.message)
    }
}

/// Which validation pass rejected the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCode {
    InvalidIndex,
    InvalidType,
    InvalidUserCommandInput,
    InvalidUserCommandReturnValue,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidIndex => "InvalidIndex",
            Self::InvalidType => "InvalidType",
            Self::InvalidUserCommandInput => "InvalidUserCommandInput",
            Self::InvalidUserCommandReturnValue => "InvalidUserCommandReturnValue",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised whenever a validation pass yields a non-empty violation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    pub details: Vec<Violation>,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>, details: Vec<Violation>) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    /// Returns `Ok(())` for an empty list, otherwise the error carrying every violation.
    pub fn check(
        code: ValidationCode,
        message: impl Into<String>,
        details: Vec<Violation>,
    ) -> std::result::Result<(), Self> {
        if details.is_empty() {
            return Ok(());
        }
        Err(Self::new(code, message, details))
    }

    pub fn constraint_names(&self) -> Vec<&str> {
        self.details.iter().map(|v| v.constraint.as_str()).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for violation in &self.details {
            write!(f, "; {}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Failure reported by a persistence adapter.
///
/// The engine never wraps, retries or rewrites these; callers see exactly what
/// the vault produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Record not found in topic '{topic}' for index {index}")]
    NotFound { topic: String, index: String },

    #[error("Record already exists in topic '{topic}' for index {index}")]
    AlreadyExists { topic: String, index: String },

    #[error("Vault '{0}' is not configured")]
    UnknownVault(String),

    #[error("No vault route for topic '{0}'")]
    NoRoute(String),

    #[error("Adapter callback was dropped before completing '{0}'")]
    CallbackDropped(&'static str),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Coarse classification used when reporting failures to a remote caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    BadInput,
    BadOutput,
    Storage,
    Configuration,
    Internal,
}

#[derive(Error, Debug)]
pub enum ArchivistError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Cannot transform value into {target}: {source}")]
    Transform {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Index of '{0}' entity is already assigned")]
    IndexAlreadyAssigned(String),

    #[error("Entity of topic '{0}' has no index")]
    MissingIndex(String),

    #[error("Adapter returned {returned} results for {expected} queries")]
    MgetShapeMismatch { expected: usize, returned: usize },

    #[error("Topic '{0}' is already defined")]
    TopicAlreadyDefined(String),

    #[error("Topic definition '{file}' exposes mismatching name '{name}'")]
    TopicNameMismatch { file: String, name: String },

    #[error("Topic '{0}' is not registered")]
    UnknownTopic(String),

    #[error("ACL can only be attached to '{entry}' of command '{command}', found it on '{method}'")]
    AclOnNonEntryMethod {
        command: String,
        method: String,
        entry: &'static str,
    },

    #[error("Command '{0}' is already registered")]
    CommandAlreadyRegistered(String),

    #[error("Command '{0}' is not registered")]
    UnknownCommand(String),

    #[error("Parameter '{param}' of command '{command}' has unregistered type '{type_name}'")]
    UnknownParameterType {
        command: String,
        param: String,
        type_name: String,
    },

    #[error("Argument {position} cannot be taken as {expected}")]
    ArgumentType {
        position: usize,
        expected: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArchivistError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(err) => match err.code {
                ValidationCode::InvalidUserCommandReturnValue => ErrorClass::BadOutput,
                _ => ErrorClass::BadInput,
            },
            Self::Transform { .. } => ErrorClass::BadInput,
            Self::Adapter(_) | Self::MgetShapeMismatch { .. } => ErrorClass::Storage,
            Self::TopicAlreadyDefined(_)
            | Self::TopicNameMismatch { .. }
            | Self::AclOnNonEntryMethod { .. }
            | Self::CommandAlreadyRegistered(_)
            | Self::UnknownParameterType { .. }
            | Self::Config(_) => ErrorClass::Configuration,
            Self::UnknownCommand(_) => ErrorClass::BadInput,
            Self::IndexAlreadyAssigned(_)
            | Self::MissingIndex(_)
            | Self::UnknownTopic(_)
            | Self::ArgumentType { .. } => ErrorClass::Internal,
        }
    }

    /// The validation payload, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub fn validation_code(&self) -> Option<ValidationCode> {
        self.validation().map(|err| err.code)
    }
}

pub type Result<T> = std::result::Result<T, ArchivistError>;
