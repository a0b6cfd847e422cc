//! Foundry admission: plugins implementing mutating and/or validating phases,
//! a name-keyed factory registry, and the ordered chain every mutation passes
//! through before it reaches strategy validation and storage.

#![forbid(unsafe_code)]

mod attributes;
pub mod builtin;
mod chain;
mod config;
mod errors;
mod handler;
mod hook;
mod interfaces;
mod plugins;

pub use attributes::Attributes;
pub use builtin::{AlwaysAdmit, AlwaysDeny};
pub use chain::Chain;
pub use config::{AdmissionConfig, PluginConfig};
pub use errors::{AdmissionError, AdmissionResult};
pub use handler::Handler;
pub use hook::ChainHook;
pub use interfaces::{Interface, MutationInterface, ValidationInterface};
pub use plugins::{Factory, Plugins};
