//! Foundry core types: kind identifiers, resource descriptors, the object traits
//! every served kind implements, and the per-request context.

#![forbid(unsafe_code)]

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

mod error;
mod strategy;

pub use error::{ApiError, ApiResult, FieldError, FieldErrorList, FieldErrorType};
pub use strategy::Strategy;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self { group: group.to_string(), kind: kind.to_string() }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() { write!(f, "{}", self.kind) } else { write!(f, "{}.{}", self.kind, self.group) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: &str, version: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string() }
    }

    /// Parse an `apiVersion` string: `group/version`, or bare `version` for the core group.
    pub fn parse(api_version: &str) -> Option<Self> {
        let parts: Vec<_> = api_version.split('/').collect();
        match parts.as_slice() {
            [version] if !version.is_empty() => Some(Self::new("", version)),
            [group, version] if !group.is_empty() && !version.is_empty() => Some(Self::new(group, version)),
            _ => None,
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    pub fn with_kind(&self, kind: &str) -> GroupVersionKind {
        GroupVersionKind::new(&self.group, &self.version, kind)
    }
}

/// A registered kind as addressed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), kind: kind.to_string() }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind { group: self.group.clone(), kind: self.kind.clone() }
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion { group: self.group.clone(), version: self.version.clone() }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Kind of mutation being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Non-mutating access such as exec or proxy.
    Connect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Connect => write!(f, "CONNECT"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Operation::Create),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            "CONNECT" => Ok(Operation::Connect),
            other => Err(ApiError::bad_request(format!("unknown operation {:?}", other))),
        }
    }
}

/// Schema descriptor of a served resource. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub singular: String,
    pub namespaced: bool,
}

impl ResourceDescriptor {
    /// Singular name defaults to the lowercased kind.
    pub fn new(group: &str, version: &str, kind: &str, plural: &str, namespaced: bool) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            singular: kind.to_lowercase(),
            namespaced,
        }
    }

    pub fn with_singular(mut self, singular: &str) -> Self {
        self.singular = singular.to_string();
        self
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(&self.group, &self.version, &self.kind)
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(&self.group, &self.version)
    }

    pub fn list_kind(&self) -> String {
        format!("{}List", self.kind)
    }

    /// Group-qualified plural, as used in error messages (`foos.demo.k8s.io`).
    pub fn qualified_resource(&self) -> String {
        if self.group.is_empty() { self.plural.clone() } else { format!("{}.{}", self.plural, self.group) }
    }
}

/// Dynamic view of any served object: metadata access plus downcasting.
pub trait ApiObject: Any + Send + Sync + fmt::Debug {
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn group_kind(&self) -> GroupKind;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Internal (hub) representation of a registered kind.
pub trait Kind: ApiObject + Clone + PartialEq {
    const GROUP: &'static str;
    const KIND: &'static str;

    fn static_group_kind() -> GroupKind {
        GroupKind::new(Self::GROUP, Self::KIND)
    }
}

/// Implement [`ApiObject`] and [`Kind`] for a struct with a `metadata: ObjectMeta` field.
#[macro_export]
macro_rules! impl_kind {
    ($ty:ty, $group:expr, $kind:expr) => {
        impl $crate::ApiObject for $ty {
            fn meta(&self) -> &$crate::ObjectMeta { &self.metadata }
            fn meta_mut(&mut self) -> &mut $crate::ObjectMeta { &mut self.metadata }
            fn group_kind(&self) -> $crate::GroupKind { $crate::GroupKind::new($group, $kind) }
            fn as_any(&self) -> &dyn ::std::any::Any { self }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any { self }
        }

        impl $crate::Kind for $ty {
            const GROUP: &'static str = $group;
            const KIND: &'static str = $kind;
        }
    };
}

static EMPTY_MAP: BTreeMap<String, String> = BTreeMap::new();

/// Convenience accessors over the all-optional `ObjectMeta`.
pub trait MetaExt {
    fn name_or_empty(&self) -> &str;
    fn namespace_or_empty(&self) -> &str;
    fn resource_version_or_empty(&self) -> &str;
    fn uid_or_empty(&self) -> &str;
    fn labels_or_empty(&self) -> &BTreeMap<String, String>;
}

impl MetaExt for ObjectMeta {
    fn name_or_empty(&self) -> &str { self.name.as_deref().unwrap_or("") }
    fn namespace_or_empty(&self) -> &str { self.namespace.as_deref().unwrap_or("") }
    fn resource_version_or_empty(&self) -> &str { self.resource_version.as_deref().unwrap_or("") }
    fn uid_or_empty(&self) -> &str { self.uid.as_deref().unwrap_or("") }
    fn labels_or_empty(&self) -> &BTreeMap<String, String> { self.labels.as_ref().unwrap_or(&EMPTY_MAP) }
}

/// Authenticated identity handed over by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub uid: String,
    pub groups: Vec<String>,
}

/// Per-request context: target namespace, caller identity and cancellation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    namespace: Option<String>,
    user: Option<UserInfo>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self { Self::default() }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn namespace(&self) -> Option<&str> { self.namespace.as_deref().filter(|ns| !ns.is_empty()) }
    pub fn user(&self) -> Option<&UserInfo> { self.user.as_ref() }
    pub fn cancellation(&self) -> &CancellationToken { &self.cancel }
    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

    pub fn check_cancelled(&self) -> ApiResult<()> {
        if self.cancel.is_cancelled() { Err(ApiError::Cancelled) } else { Ok(()) }
    }
}
