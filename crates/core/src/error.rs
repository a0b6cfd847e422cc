//! Classified API errors shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldErrorType {
    Required,
    Invalid,
    Duplicate,
    Forbidden,
    NotSupported,
    TooLong,
}

impl FieldErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldErrorType::Required => "FieldValueRequired",
            FieldErrorType::Invalid => "FieldValueInvalid",
            FieldErrorType::Duplicate => "FieldValueDuplicate",
            FieldErrorType::Forbidden => "FieldValueForbidden",
            FieldErrorType::NotSupported => "FieldValueNotSupported",
            FieldErrorType::TooLong => "FieldValueTooLong",
        }
    }
}

/// One field-path/message pair of a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub error_type: FieldErrorType,
    pub value: String,
    pub detail: String,
}

pub type FieldErrorList = Vec<FieldError>;

impl FieldError {
    pub fn required(field: &str, detail: &str) -> Self {
        Self { field: field.to_string(), error_type: FieldErrorType::Required, value: String::new(), detail: detail.to_string() }
    }

    pub fn invalid(field: &str, value: &str, detail: &str) -> Self {
        Self { field: field.to_string(), error_type: FieldErrorType::Invalid, value: value.to_string(), detail: detail.to_string() }
    }

    pub fn forbidden(field: &str, detail: &str) -> Self {
        Self { field: field.to_string(), error_type: FieldErrorType::Forbidden, value: String::new(), detail: detail.to_string() }
    }

    pub fn not_supported(field: &str, value: &str, supported: &[&str]) -> Self {
        let detail = format!(
            "supported values: {}",
            supported.iter().map(|s| format!("\"{}\"", s)).collect::<Vec<_>>().join(", ")
        );
        Self { field: field.to_string(), error_type: FieldErrorType::NotSupported, value: value.to_string(), detail }
    }

    pub fn too_long(field: &str, value: &str, max: usize) -> Self {
        Self {
            field: field.to_string(),
            error_type: FieldErrorType::TooLong,
            value: value.to_string(),
            detail: format!("must have at most {} bytes", max),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match self.error_type {
            FieldErrorType::Required => return write!(f, "{}: Required value{}", self.field, suffix(&self.detail)),
            FieldErrorType::Forbidden => return write!(f, "{}: Forbidden{}", self.field, suffix(&self.detail)),
            FieldErrorType::Invalid => "Invalid value",
            FieldErrorType::Duplicate => "Duplicate value",
            FieldErrorType::NotSupported => "Unsupported value",
            FieldErrorType::TooLong => "Too long",
        };
        write!(f, "{}: {}: \"{}\"{}", self.field, head, self.value, suffix(&self.detail))
    }
}

fn suffix(detail: &str) -> String {
    if detail.is_empty() { String::new() } else { format!(": {}", detail) }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    match errors {
        [only] => only.to_string(),
        _ => format!("[{}]", errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")),
    }
}

/// Error taxonomy surfaced to the transport layer with its classification intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{resource} \"{name}\" not found")]
    NotFound { resource: String, name: String },

    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists { resource: String, name: String },

    /// Resource version mismatch.
    #[error("Operation cannot be fulfilled on {resource} \"{name}\": {message}")]
    Conflict { resource: String, name: String, message: String },

    #[error("{kind} \"{name}\" is invalid: {}", join_field_errors(.errors))]
    Invalid { kind: String, name: String, errors: FieldErrorList },

    /// Admission rejection.
    #[error("{resource} \"{name}\" is forbidden: {reason}")]
    Forbidden { resource: String, name: String, reason: String },

    /// Requested resource version is no longer retained.
    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        ApiError::NotFound { resource: resource.into(), name: name.into() }
    }

    pub fn already_exists(resource: impl Into<String>, name: impl Into<String>) -> Self {
        ApiError::AlreadyExists { resource: resource.into(), name: name.into() }
    }

    pub fn conflict(resource: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Conflict { resource: resource.into(), name: name.into(), message: message.into() }
    }

    pub fn invalid(kind: impl Into<String>, name: impl Into<String>, errors: FieldErrorList) -> Self {
        ApiError::Invalid { kind: kind.into(), name: name.into(), errors }
    }

    pub fn forbidden(resource: impl Into<String>, name: impl Into<String>, reason: impl Into<String>) -> Self {
        ApiError::Forbidden { resource: resource.into(), name: name.into(), reason: reason.into() }
    }

    pub fn gone(message: impl Into<String>) -> Self { ApiError::Gone(message.into()) }
    pub fn bad_request(message: impl Into<String>) -> Self { ApiError::BadRequest(message.into()) }
    pub fn internal(message: impl Into<String>) -> Self { ApiError::Internal(message.into()) }

    /// HTTP-equivalent status code.
    pub fn code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::AlreadyExists { .. } | ApiError::Conflict { .. } => 409,
            ApiError::Invalid { .. } => 422,
            ApiError::Forbidden { .. } => 403,
            ApiError::Gone(_) => 410,
            ApiError::BadRequest(_) => 400,
            ApiError::Cancelled => 499,
            ApiError::Internal(_) => 500,
        }
    }

    /// Machine-readable reason, in the vocabulary of `metav1.Status`.
    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NotFound",
            ApiError::AlreadyExists { .. } => "AlreadyExists",
            ApiError::Conflict { .. } => "Conflict",
            ApiError::Invalid { .. } => "Invalid",
            ApiError::Forbidden { .. } => "Forbidden",
            ApiError::Gone(_) => "Gone",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Cancelled => "Cancelled",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, ApiError::NotFound { .. }) }
    pub fn is_already_exists(&self) -> bool { matches!(self, ApiError::AlreadyExists { .. }) }
    pub fn is_conflict(&self) -> bool { matches!(self, ApiError::Conflict { .. }) }
    pub fn is_invalid(&self) -> bool { matches!(self, ApiError::Invalid { .. }) }
    pub fn is_forbidden(&self) -> bool { matches!(self, ApiError::Forbidden { .. }) }
    pub fn is_gone(&self) -> bool { matches!(self, ApiError::Gone(_)) }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("malformed object: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_error_display() {
        let err = ApiError::invalid(
            "Foo",
            "x",
            vec![
                FieldError::required("spec.image", ""),
                FieldError::not_supported("status.phase", "Broken", &["Processing", "Ready"]),
            ],
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Foo \"x\" is invalid: ["));
        assert!(msg.contains("spec.image: Required value"));
        assert!(msg.contains("status.phase: Unsupported value: \"Broken\": supported values: \"Processing\", \"Ready\""));
        assert_eq!(err.code(), 422);
    }

    #[test]
    fn forbidden_error_display() {
        let err = ApiError::forbidden("foos.demo.k8s.io", "kube-system/x", "namespace/kube-system is not permitted");
        assert_eq!(err.to_string(), "foos.demo.k8s.io \"kube-system/x\" is forbidden: namespace/kube-system is not permitted");
        assert_eq!(err.reason(), "Forbidden");
        assert!(err.is_forbidden());
    }

    #[test]
    fn single_field_error_not_bracketed() {
        let err = ApiError::invalid("Foo", "x", vec![FieldError::invalid("metadata.name", "X", "must be lowercase")]);
        assert_eq!(err.to_string(), "Foo \"x\" is invalid: metadata.name: Invalid value: \"X\": must be lowercase");
    }
}
