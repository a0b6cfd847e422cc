//! Key-value backend contract consumed by the generic store.

use foundry_core::ApiError;
use futures::stream::BoxStream;

/// One stored value at a given revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub create_revision: u64,
    pub mod_revision: u64,
}

/// One page of a range scan, read at a single snapshot revision.
#[derive(Debug, Clone, Default)]
pub struct RangePage {
    pub items: Vec<KeyValue>,
    /// More keys under the prefix follow the last item.
    pub more: bool,
    pub revision: u64,
}

/// A committed change. `current` is absent for deletions, `previous` for creations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEvent {
    pub revision: u64,
    pub key: String,
    pub current: Option<KeyValue>,
    pub previous: Option<KeyValue>,
}

pub type ChangeStream = BoxStream<'static, Result<BackendEvent, BackendError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("key {0} already exists")]
    KeyExists(String),
    #[error("key {0} not found")]
    NotFound(String),
    #[error("revision mismatch on {key}: expected {expected}, found {actual}")]
    Conflict { key: String, expected: u64, actual: u64 },
    #[error("revision {requested} has been compacted (floor {floor})")]
    Compacted { requested: u64, floor: u64 },
    #[error("revision {requested} is newer than the current revision {current}")]
    FutureRevision { requested: u64, current: u64 },
    #[error("subscriber fell behind by {0} events")]
    Lagged(u64),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Classify for the caller, attributing key-level failures to `resource`/`name`.
    pub fn into_api_error(self, resource: &str, name: &str) -> ApiError {
        match self {
            BackendError::KeyExists(_) => ApiError::already_exists(resource, name),
            BackendError::NotFound(_) => ApiError::not_found(resource, name),
            BackendError::Conflict { .. } => ApiError::conflict(
                resource,
                name,
                "the object has been modified; please apply your changes to the latest version and try again",
            ),
            other => other.into(),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::KeyExists(key) => ApiError::already_exists("keys", key),
            BackendError::NotFound(key) => ApiError::not_found("keys", key),
            BackendError::Conflict { ref key, .. } => ApiError::conflict("keys", key.clone(), e.to_string()),
            BackendError::Compacted { requested, floor } => {
                ApiError::gone(format!("too old resource version: {requested} ({floor})"))
            }
            BackendError::FutureRevision { requested, current } => {
                ApiError::bad_request(format!("too large resource version: {requested}, current: {current}"))
            }
            BackendError::Lagged(n) => ApiError::gone(format!("watch fell behind by {n} events; restart from a fresh list")),
            BackendError::Unavailable(msg) => ApiError::internal(msg),
        }
    }
}

/// Abstract versioned key-value store. Every successful write bumps a single,
/// monotonically increasing revision; that revision is the objects' resource version.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>, BackendError>;

    /// Insert only if the key is absent.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KeyValue, BackendError>;

    /// Replace the value only if the key's current revision is `expected_revision`.
    async fn compare_and_swap(&self, key: &str, expected_revision: u64, value: Vec<u8>) -> Result<KeyValue, BackendError>;

    /// Remove the key only if its current revision is `expected_revision`; returns the removed value.
    async fn delete(&self, key: &str, expected_revision: u64) -> Result<KeyValue, BackendError>;

    /// Keys under `prefix` strictly after `start_after`, in key order, as of `revision`
    /// (latest when `None`). `limit == 0` means no limit.
    async fn range(&self, prefix: &str, start_after: Option<&str>, limit: usize, revision: Option<u64>) -> Result<RangePage, BackendError>;

    /// Changes under `prefix` committed after `from_revision`, then live changes.
    async fn subscribe(&self, prefix: &str, from_revision: u64) -> Result<ChangeStream, BackendError>;

    async fn current_revision(&self) -> Result<u64, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_errors_name_the_object() {
        let err = BackendError::KeyExists("/registry/foos/default/a".into()).into_api_error("foos.demo.k8s.io", "a");
        assert_eq!(err, ApiError::already_exists("foos.demo.k8s.io", "a"));
        let err = BackendError::Conflict { key: "/k".into(), expected: 1, actual: 2 }.into_api_error("foos.demo.k8s.io", "a");
        assert!(err.is_conflict());
        assert_eq!(ApiError::from(BackendError::NotFound("/k".into())), ApiError::not_found("keys", "/k"));
    }

    #[test]
    fn revision_errors_keep_their_class() {
        assert!(BackendError::Compacted { requested: 1, floor: 5 }.into_api_error("foos", "").is_gone());
        assert!(ApiError::from(BackendError::Lagged(3)).is_gone());
        assert_eq!(ApiError::from(BackendError::FutureRevision { requested: 9, current: 4 }).code(), 400);
        assert_eq!(ApiError::from(BackendError::Unavailable("down".into())).code(), 500);
    }
}
