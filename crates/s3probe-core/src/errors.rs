//! Error taxonomy for plan construction, operation calls and orchestration.

use thiserror::Error;

/// Raised by an operation's `validate` step when a parameter is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: invalid parameter '{field}': {reason}")]
pub struct ParameterError {
    pub operation: String,
    pub field: String,
    pub reason: String,
}

impl ParameterError {
    pub fn new(
        operation: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(operation: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(operation, field, "required parameter is missing")
    }
}

/// A transport or system level fault. Structured service errors never use this type;
/// they are captured into an [`OutcomeRecord`](crate::operation::OutcomeRecord).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationFault {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("local error: {message}")]
    Local { message: String },
}

impl OperationFault {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self::Local {
            message: message.into(),
        }
    }
}

/// Invalid plan objects (construction-time invariants and structural checks).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("error_code is required when success is false")]
    MissingErrorCode,

    #[error("error_code '{0}' must not be set when success is true")]
    UnexpectedErrorCode(String),

    #[error("invalid body pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid endpoint url '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid region '{0}'")]
    InvalidRegion(String),

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("group '{0}' has no run operations")]
    EmptyRunPhase(String),

    #[error("plan parse error: {0}")]
    Parse(String),

    #[error("plan is invalid: {0}")]
    Invalid(String),
}

/// Orchestration faults raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("test group not found: {name}")]
    GroupNotFound { name: String },

    #[error("credential not found: {name}")]
    CredentialNotFound { name: String },

    #[error("failed to build client for credential '{credential}': {message}")]
    Connection { credential: String, message: String },

    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("group task '{group}' did not complete: {message}")]
    GroupTask { group: String, message: String },
}

impl EngineError {
    /// Group-scoped faults abort only the group that raised them.
    pub fn is_group_scoped(&self) -> bool {
        matches!(
            self,
            Self::CredentialNotFound { .. }
                | Self::Connection { .. }
                | Self::Cancelled
                | Self::GroupTask { .. }
        )
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_error_names_field() {
        let err = ParameterError::missing("PutObject", "bucket");
        assert_eq!(
            err.to_string(),
            "PutObject: invalid parameter 'bucket': required parameter is missing"
        );
    }

    #[test]
    fn group_scope_classification() {
        assert!(EngineError::CredentialNotFound { name: "c".into() }.is_group_scoped());
        assert!(EngineError::Connection {
            credential: "c".into(),
            message: "bad".into()
        }
        .is_group_scoped());
        assert!(!EngineError::GroupNotFound { name: "g".into() }.is_group_scoped());
    }
}
