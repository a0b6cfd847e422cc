//! `metav1.Status` rendering of classified errors.

use foundry_core::ApiError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Status, StatusCause, StatusDetails};

pub const STATUS_FAILURE: &str = "Failure";

/// Split `plural.group` back into its parts.
fn split_resource(resource: &str) -> (Option<String>, String) {
    match resource.split_once('.') {
        Some((plural, group)) => (Some(group.to_string()), plural.to_string()),
        None => (None, resource.to_string()),
    }
}

fn details(resource: &str, name: &str) -> StatusDetails {
    let (group, kind) = split_resource(resource);
    StatusDetails { group, kind: Some(kind), name: Some(name.to_string()), ..Default::default() }
}

/// Failure status carrying the error's code, reason and, where the error names
/// an object, its details.
pub fn status_for(err: &ApiError) -> Status {
    let details = match err {
        ApiError::NotFound { resource, name }
        | ApiError::AlreadyExists { resource, name }
        | ApiError::Conflict { resource, name, .. }
        | ApiError::Forbidden { resource, name, .. } => Some(details(resource, name)),
        ApiError::Invalid { kind, name, errors } => {
            let (group, kind) = split_resource(kind);
            let causes = errors
                .iter()
                .map(|e| StatusCause {
                    field: Some(e.field.clone()),
                    message: Some(e.to_string()),
                    reason: Some(e.error_type.as_str().to_string()),
                })
                .collect();
            Some(StatusDetails { group, kind: Some(kind), name: Some(name.clone()), causes: Some(causes), ..Default::default() })
        }
        ApiError::Gone(_) | ApiError::BadRequest(_) | ApiError::Cancelled | ApiError::Internal(_) => None,
    };
    Status {
        status: Some(STATUS_FAILURE.to_string()),
        code: Some(i32::from(err.code())),
        reason: Some(err.reason().to_string()),
        message: Some(err.to_string()),
        details,
        ..Default::default()
    }
}

pub fn status_json(err: &ApiError) -> serde_json::Value {
    serde_json::to_value(status_for(err)).unwrap_or_else(|_| serde_json::json!({ "message": err.to_string() }))
}
