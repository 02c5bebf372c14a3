//! Fatal configuration failures
//!
//! Misconfiguration (duplicate topics, misplaced ACLs, unresolvable parameter
//! types) must stop startup. `crash` logs the error at emergency severity and
//! hands it back so registration code can return it with `?`.

use crate::core::ArchivistError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::error;

/// Log severities understood by the crash sink, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Emergency => "emergency",
            Self::Alert => "alert",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Logs `err` at emergency severity with structured details and returns it.
pub fn crash(err: ArchivistError, details: Value) -> ArchivistError {
    error!(
        target: "archivist::crash",
        severity = %Severity::Emergency,
        details = %details,
        "{}",
        err
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crash_returns_the_error() {
        let err = crash(
            ArchivistError::TopicAlreadyDefined("Player".to_string()),
            json!({"topic": "Player"}),
        );
        assert!(matches!(err, ArchivistError::TopicAlreadyDefined(name) if name == "Player"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Emergency < Severity::Error);
        assert_eq!(Severity::Emergency.to_string(), "emergency");
    }
}
