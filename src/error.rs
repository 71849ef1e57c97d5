//! Error taxonomy at the service boundary.
//!
//! Each layer has its own `thiserror` enum; services fold them into
//! [`ServiceError`], which the API layer renders as a problem body.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::security::{AuthError, Role};

/// Field-level validation failures, keyed by request field name.
///
/// Collected rather than failing on the first problem so a client sees every
/// bad field in one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for a single failing field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    /// Moves every message from `other` into `self`, after any already
    /// recorded for the same field.
    pub fn extend(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a failed catalog or account operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or out-of-range request fields (400).
    #[error("one or more validation errors occurred: {0}")]
    Validation(#[from] ValidationErrors),

    /// Missing, invalid or expired token, or bad login credentials (401).
    /// The detail is safe to show to the caller.
    #[error("authentication failed: {detail}")]
    Authentication { detail: String },

    /// Valid principal without the required role (403).
    #[error("the {required} role is required for this operation")]
    Authorization { required: Role },

    /// A collaborator failed unexpectedly (500). The source is logged, never shown.
    #[error("internal error: {0}")]
    Internal(#[source] BoxError),
}

impl ServiceError {
    pub fn internal(source: impl Into<BoxError>) -> Self {
        Self::Internal(source.into())
    }

    pub fn authentication(detail: impl Into<String>) -> Self {
        Self::Authentication {
            detail: detail.into(),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        Self::authentication(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
