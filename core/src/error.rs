//! Error types for the request binder.
//!
//! # Design
//! Everything that can go wrong before the network is touched is a
//! `BindError` variant raised synchronously by `ApiCaller::build`. Failures
//! reported by the transport keep their own data type, `TransportFailure`,
//! because the caller receives that payload verbatim: the binder never
//! rewrites it, it only wraps it in `BindError::Transport`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::ScalarType;

/// Errors returned by `ApiCaller` and the schema model.
#[derive(Debug, Error)]
pub enum BindError {
    /// A parameter name that the schema does not declare.
    #[error("Field '{0}' unknown")]
    UnknownField(String),

    /// A required field was sent with an explicit `null`.
    #[error("Field '{0}' is required!")]
    RequiredNull(String),

    /// Required fields that never appeared in any bucket, in declaration order.
    #[error("Fields [{}] are required, but not found", .0.join(","))]
    RequiredMissing(Vec<String>),

    /// A value could not be converted to the declared type.
    #[error("Field '{field}': cannot convert {value} to {expected}")]
    Coercion {
        field: String,
        expected: ScalarType,
        value: Value,
    },

    /// The same field name was declared twice in one schema.
    #[error("Field '{0}' declared more than once")]
    DuplicateField(String),

    /// The transport reported a failure (network error or non-2xx status).
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

impl BindError {
    /// The transport payload, if this error came from the transport.
    pub fn transport(&self) -> Option<&TransportFailure> {
        match self {
            BindError::Transport(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Failure payload produced by a transport.
///
/// `status` is 0 when no HTTP response was received at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("HTTP {status} {status_text}")]
pub struct TransportFailure {
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    #[serde(default)]
    pub body: Value,
}

impl TransportFailure {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: Value::Null,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}
