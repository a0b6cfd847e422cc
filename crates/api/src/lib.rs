//! Foundry REST adapter.
//!
//! Exposes each generic store under the uniform verb set (create, update,
//! delete, get, list, watch) over external-version JSON. Storages are grouped
//! per API group and installed into an [`ApiServer`], which the transport
//! layer dispatches already-routed requests to.

#![forbid(unsafe_code)]

mod dispatch;
mod rest;
mod server;
pub mod status;

pub use dispatch::{Reply, Request, Verb};
pub use rest::{EventStream, Rest, RestStorage, WriteResponse};
pub use server::{ApiGroupInfo, ApiServer, InstallError};
pub use status::{status_for, status_json};
