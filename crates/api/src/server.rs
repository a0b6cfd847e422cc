//! Installed API groups and resource discovery.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use tracing::info;

use foundry_core::{ApiError, ApiResult, GroupVersion};
use foundry_schema::Registry;

use crate::rest::RestStorage;

const VERBS: [&str; 6] = ["create", "delete", "get", "list", "update", "watch"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("resource {0} is already installed")]
    Duplicate(String),
    #[error("resource {0} is not registered with the type registry")]
    Unregistered(String),
    #[error("resource {resource} does not belong to group {group:?}")]
    WrongGroup { resource: String, group: String },
}

impl From<InstallError> for ApiError {
    fn from(e: InstallError) -> Self {
        match e {
            InstallError::Duplicate(ref r) => ApiError::already_exists("resources", r.clone()),
            InstallError::Unregistered(_) | InstallError::WrongGroup { .. } => ApiError::internal(e.to_string()),
        }
    }
}

/// Storages of one API group, keyed by version then plural.
pub struct ApiGroupInfo {
    group: String,
    storage: BTreeMap<String, BTreeMap<String, Arc<dyn RestStorage>>>,
}

impl ApiGroupInfo {
    pub fn new(group: &str) -> Self {
        Self { group: group.to_string(), storage: BTreeMap::new() }
    }

    pub fn group(&self) -> &str { &self.group }

    /// Add a storage under its own version and plural.
    pub fn add(&mut self, storage: Arc<dyn RestStorage>) -> Result<&mut Self, InstallError> {
        let d = storage.descriptor();
        let resource = format!("{}/{}", GroupVersion::new(&d.group, storage.version()).api_version(), d.plural);
        if d.group != self.group {
            return Err(InstallError::WrongGroup { resource, group: self.group.clone() });
        }
        let slot = self.storage.entry(storage.version().to_string()).or_default();
        if slot.contains_key(&d.plural) {
            return Err(InstallError::Duplicate(resource));
        }
        slot.insert(d.plural.clone(), storage.clone());
        Ok(self)
    }

    pub fn versions(&self) -> Vec<&str> { self.storage.keys().map(String::as_str).collect() }
}

type ResourceKey = (String, String, String);

/// Dispatch target of the transport layer: every installed (group, version, plural).
pub struct ApiServer {
    registry: Arc<Registry>,
    storage: BTreeMap<ResourceKey, Arc<dyn RestStorage>>,
}

impl ApiServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry, storage: BTreeMap::new() }
    }

    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    /// Install every storage of `info`. Nothing is installed if any entry is
    /// already served or names a kind the registry does not know.
    pub fn install_group(&mut self, info: ApiGroupInfo) -> Result<(), InstallError> {
        let mut staged = Vec::new();
        for (version, resources) in info.storage {
            for (plural, storage) in resources {
                let key = (info.group.clone(), version.clone(), plural.clone());
                let name = format!("{}/{}", GroupVersion::new(&info.group, &version).api_version(), plural);
                if self.storage.contains_key(&key) {
                    return Err(InstallError::Duplicate(name));
                }
                let gvk = GroupVersion::new(&info.group, &version).with_kind(&storage.descriptor().kind);
                if self.registry.resolve(&gvk).is_err() {
                    return Err(InstallError::Unregistered(name));
                }
                staged.push((key, storage));
            }
        }
        info!(group = %info.group, resources = staged.len(), "api: group installed");
        self.storage.extend(staged);
        Ok(())
    }

    pub fn storage(&self, group: &str, version: &str, plural: &str) -> ApiResult<Arc<dyn RestStorage>> {
        self.storage
            .get(&(group.to_string(), version.to_string(), plural.to_string()))
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found("resources", format!("{}/{}", GroupVersion::new(group, version).api_version(), plural))
            })
    }

    /// Installed resources grouped per group/version, ordered.
    pub fn discovery(&self) -> Vec<APIResourceList> {
        let mut lists: BTreeMap<String, Vec<APIResource>> = BTreeMap::new();
        for ((group, version, plural), storage) in &self.storage {
            let d = storage.descriptor();
            lists.entry(GroupVersion::new(group, version).api_version()).or_default().push(APIResource {
                name: plural.clone(),
                singular_name: d.singular.clone(),
                kind: d.kind.clone(),
                namespaced: d.namespaced,
                verbs: VERBS.iter().map(|v| v.to_string()).collect(),
                ..Default::default()
            });
        }
        lists.into_iter().map(|(group_version, resources)| APIResourceList { group_version, resources }).collect()
    }
}
