//! Target gateway error types
//!
//! Errors returned by gateway implementations, with a closed classification
//! ([`GatewayErrorKind`]) that callers use for partial-failure policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed classification of gateway failures.
///
/// Reconciliation policy is keyed on this value, never on message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// The target could not be reached.
    Connection,
    /// The caller lacks rights for the operation.
    Authorization,
    /// A user or group name could not be resolved to a principal.
    PrincipalNotResolved,
    /// An object addressed by the operation does not exist.
    NotFound,
    /// A write violated a unique-value constraint.
    DuplicateValue,
    /// The request carried data the target rejected.
    InvalidData,
    /// Anything else.
    Internal,
}

impl GatewayErrorKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayErrorKind::Connection => "connection",
            GatewayErrorKind::Authorization => "authorization",
            GatewayErrorKind::PrincipalNotResolved => "principal_not_resolved",
            GatewayErrorKind::NotFound => "not_found",
            GatewayErrorKind::DuplicateValue => "duplicate_value",
            GatewayErrorKind::InvalidData => "invalid_data",
            GatewayErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error that can occur during gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    // Connection errors (usually transient)
    /// Failed to reach the target site.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request timed out.
    #[error("request timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Target responded with a throttling or unavailable status.
    #[error("target unavailable: {message}")]
    TargetUnavailable { message: String },

    // Authorization
    /// The caller lacks the rights for the operation.
    #[error("access denied for {operation}")]
    AccessDenied { operation: String },

    // Resolution errors
    /// A user or group name could not be resolved.
    #[error("principal could not be resolved: {name}")]
    PrincipalNotResolved { name: String },

    /// Site group not found.
    #[error("group not found: {name}")]
    GroupNotFound { name: String },

    /// Role definition not found.
    #[error("role definition not found: {name}")]
    RoleDefinitionNotFound { name: String },

    /// List not found.
    #[error("list not found: {title}")]
    ListNotFound { title: String },

    /// Generic object not found.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    // Write conflicts
    /// A unique-value field received a value that already exists.
    #[error("duplicate value '{value}' for unique field '{field}'")]
    DuplicateValue { field: String, value: String },

    /// Object already exists.
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Operation errors
    /// Operation failed on the target.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GatewayError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::ConnectionFailed { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::TargetUnavailable { .. } => GatewayErrorKind::Connection,
            GatewayError::AccessDenied { .. } => GatewayErrorKind::Authorization,
            GatewayError::PrincipalNotResolved { .. } => GatewayErrorKind::PrincipalNotResolved,
            GatewayError::GroupNotFound { .. }
            | GatewayError::RoleDefinitionNotFound { .. }
            | GatewayError::ListNotFound { .. }
            | GatewayError::ObjectNotFound { .. } => GatewayErrorKind::NotFound,
            GatewayError::DuplicateValue { .. } => GatewayErrorKind::DuplicateValue,
            GatewayError::ObjectAlreadyExists { .. } | GatewayError::InvalidData { .. } => {
                GatewayErrorKind::InvalidData
            }
            GatewayError::OperationFailed { .. } | GatewayError::Internal { .. } => {
                GatewayErrorKind::Internal
            }
        }
    }

    /// Check if this error is transient and the call could be retried by the
    /// gateway's own transport layer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == GatewayErrorKind::Connection
    }

    /// Check if this error is permanent.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            GatewayError::Timeout { .. } => "TIMEOUT",
            GatewayError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            GatewayError::AccessDenied { .. } => "ACCESS_DENIED",
            GatewayError::PrincipalNotResolved { .. } => "PRINCIPAL_NOT_RESOLVED",
            GatewayError::GroupNotFound { .. } => "GROUP_NOT_FOUND",
            GatewayError::RoleDefinitionNotFound { .. } => "ROLE_DEFINITION_NOT_FOUND",
            GatewayError::ListNotFound { .. } => "LIST_NOT_FOUND",
            GatewayError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            GatewayError::DuplicateValue { .. } => "DUPLICATE_VALUE",
            GatewayError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            GatewayError::InvalidData { .. } => "INVALID_DATA",
            GatewayError::OperationFailed { .. } => "OPERATION_FAILED",
            GatewayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        GatewayError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a principal resolution error.
    pub fn principal_not_resolved(name: impl Into<String>) -> Self {
        GatewayError::PrincipalNotResolved { name: name.into() }
    }

    /// Create a duplicate value error.
    pub fn duplicate_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        GatewayError::DuplicateValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an object not found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        GatewayError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        GatewayError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GatewayError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            GatewayError::connection_failed("reset by peer"),
            GatewayError::Timeout { timeout_secs: 30 },
            GatewayError::TargetUnavailable {
                message: "429".to_string(),
            },
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert_eq!(err.kind(), GatewayErrorKind::Connection);
        }
    }

    #[test]
    fn test_recoverable_kinds() {
        assert_eq!(
            GatewayError::principal_not_resolved("i:0#.f|membership|nobody").kind(),
            GatewayErrorKind::PrincipalNotResolved
        );
        assert_eq!(
            GatewayError::duplicate_value("SKU", "ABC-1").kind(),
            GatewayErrorKind::DuplicateValue
        );
    }

    #[test]
    fn test_not_found_kinds() {
        let errors = vec![
            GatewayError::GroupNotFound {
                name: "Approvers".to_string(),
            },
            GatewayError::RoleDefinitionNotFound {
                name: "Approve".to_string(),
            },
            GatewayError::ListNotFound {
                title: "Products".to_string(),
            },
            GatewayError::not_found("item 12"),
        ];

        for err in errors {
            assert_eq!(err.kind(), GatewayErrorKind::NotFound);
            assert!(err.is_permanent());
        }
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::duplicate_value("SKU", "ABC-1");
        assert_eq!(
            err.to_string(),
            "duplicate value 'ABC-1' for unique field 'SKU'"
        );
        assert_eq!(err.error_code(), "DUPLICATE_VALUE");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            GatewayErrorKind::PrincipalNotResolved.to_string(),
            "principal_not_resolved"
        );
    }
}
