//! The `demo.k8s.io` API group.
//!
//! One namespace-scoped kind, `Foo`, served as `v1alpha1` and stored under the
//! configured prefix, plus the `DisallowFoo` admission plugin.

#![forbid(unsafe_code)]

use std::sync::Arc;

use foundry_admission::{AdmissionResult, Plugins};
use foundry_api::{ApiGroupInfo, Rest};
use foundry_core::{ApiResult, GroupVersionKind, ResourceDescriptor};
use foundry_schema::{Registry, RegistryBuilder, RegistryError};
use foundry_store::{AdmissionHook, Backend, Store};
use tracing::info;

pub mod disallow;
mod strategy;
mod types;
pub mod v1alpha1;

pub use disallow::DisallowFoo;
pub use strategy::FooStrategy;
pub use types::*;

pub const GROUP: &str = "demo.k8s.io";

/// Default storage prefix for the group.
pub const DEFAULT_PREFIX: &str = "/registry/demo";

pub fn foo_descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(GROUP, v1alpha1::VERSION, "Foo", "foos", true)
}

pub fn foo_gvk() -> GroupVersionKind { foo_descriptor().gvk() }

/// Register every served version of the group's kinds.
pub fn install(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register(foo_descriptor(), FooStrategy::new, v1alpha1::codec())?;
    Ok(())
}

/// Register the group's admission plugins.
pub fn register_plugins(plugins: &mut Plugins) -> AdmissionResult<()> {
    disallow::register(plugins)
}

/// Storage for every served resource of the group, ready for `ApiServer::install_group`.
pub fn api_group(
    registry: Arc<Registry>,
    backend: Arc<dyn Backend>,
    prefix: &str,
    admission: Arc<dyn AdmissionHook<Foo>>,
) -> ApiResult<ApiGroupInfo> {
    let foos = Store::<Foo>::new(registry, &foo_gvk(), backend, prefix)?;
    let mut info = ApiGroupInfo::new(GROUP);
    info.add(Arc::new(Rest::new(foos).with_admission(admission)))?;
    info!(group = GROUP, prefix = %prefix, "demo: storage ready");
    Ok(info)
}
