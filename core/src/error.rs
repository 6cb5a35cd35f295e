//! Error types for the consent client.
//!
//! # Design
//! "Not found" is not an error for lookups and deletes; those return
//! `None` or `false`. Everything else the service can say is one of a
//! small set of kinds: bad input (`Validation`, whether caught locally or
//! returned as a 400), a distinguishable group lookup or permission failure
//! on update, or `Configuration` for any unexpected status, carrying the
//! raw body for diagnostics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-field validation messages, as returned by the service in a 400 body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to the list for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl From<BTreeMap<String, Vec<String>>> for ValidationErrors {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(","))?;
        }
        Ok(())
    }
}

/// Errors returned by `ConsentClient` and the `ConsentRequests` parsers.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// Bad input, detected locally or reported by the service with a 400.
    #[error("{message}")]
    Validation {
        message: String,
        errors: ValidationErrors,
    },

    /// Unexpected status or unusable client configuration.
    #[error("{message}")]
    Configuration {
        message: String,
        body: Option<String>,
    },

    /// `update_consent_group` targeted a group that does not exist.
    #[error("consent group {group_id} does not exist")]
    GroupNotFound { group_id: Uuid },

    /// The subscription may not manage the consent group (401 on update).
    #[error("you do not have permission to manage consent group {group_id}")]
    PermissionDenied { group_id: Uuid },

    /// Propagated unchanged from the token provider.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-success status from an operation without a dedicated mapping.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ConsentError {
    /// Build a `Validation` error whose message lists every field.
    pub fn validation(errors: ValidationErrors) -> Self {
        let message = if errors.is_empty() {
            "invalid consent parameters".to_string()
        } else {
            format!("invalid consent parameters ({errors})")
        };
        ConsentError::Validation { message, errors }
    }

    /// Shorthand for a single-field `Validation` error.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::validation(errors)
    }

    pub(crate) fn configuration(body: &str) -> Self {
        ConsentError::Configuration {
            message: "invalid configuration provided to access consent service".to_string(),
            body: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// The per-field messages, if this is a `Validation` error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ConsentError::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Failures raised while executing a request, before any status was seen.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("reading response from {url} failed: {message}")]
    Body { url: String, message: String },
}

/// Errors from a `TokenProvider`.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),

    #[error("token provider config error: {0}")]
    Config(String),
}
