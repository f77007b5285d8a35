//! Provisioning error types.

use sitewright_gateway::{GatewayError, GatewayErrorKind};
use thiserror::Error;

/// Errors that abort a provisioning or extraction run.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Gateway call failed with an error no handler recovers from.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A list named by the template does not exist on the target.
    #[error("List not found: {title}")]
    ListNotFound { title: String },

    /// The template is internally inconsistent.
    #[error("Invalid template: {message}")]
    InvalidTemplate { message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A structured fragment could not be parsed.
    #[error("XML parse error: {message}")]
    XmlParse { message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProvisioningError {
    /// Create an invalid template error.
    pub fn invalid_template(message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an XML parse error.
    pub fn xml_parse(message: impl Into<String>) -> Self {
        Self::XmlParse {
            message: message.into(),
        }
    }

    /// Classification of the underlying gateway failure, if any.
    #[must_use]
    pub fn gateway_kind(&self) -> Option<GatewayErrorKind> {
        match self {
            Self::Gateway(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Result type for provisioning operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
