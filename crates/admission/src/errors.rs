//! Admission error types.

use foundry_core::ApiError;
use thiserror::Error;

pub type AdmissionResult<T> = Result<T, AdmissionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Plugin rejection; the chain reports it as forbidden on the request's resource.
    #[error("{0}")]
    Denied(String),

    /// Rejection naming its own resource and object.
    #[error("{resource} \"{name}\" is forbidden: {reason}")]
    Forbidden { resource: String, name: String, reason: String },

    #[error("{0}")]
    BadRequest(String),

    /// Plugin construction or configuration failure.
    #[error("admission config: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    pub fn denied(reason: impl Into<String>) -> Self { AdmissionError::Denied(reason.into()) }

    pub fn forbidden(resource: impl Into<String>, name: impl Into<String>, reason: impl Into<String>) -> Self {
        AdmissionError::Forbidden { resource: resource.into(), name: name.into(), reason: reason.into() }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self { AdmissionError::BadRequest(msg.into()) }
    pub fn config(msg: impl Into<String>) -> Self { AdmissionError::Config(msg.into()) }
    pub fn internal(msg: impl Into<String>) -> Self { AdmissionError::Internal(msg.into()) }

    /// Classify for the caller, attributing bare denials to `resource`/`name`.
    pub fn into_api_error(self, resource: &str, name: &str) -> ApiError {
        match self {
            AdmissionError::Denied(reason) => ApiError::forbidden(resource, name, reason),
            other => other.into(),
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Denied(reason) => ApiError::forbidden("", "", reason),
            AdmissionError::Forbidden { resource, name, reason } => ApiError::forbidden(resource, name, reason),
            AdmissionError::BadRequest(msg) => ApiError::bad_request(msg),
            AdmissionError::Config(msg) | AdmissionError::Internal(msg) => ApiError::internal(msg),
        }
    }
}
