//! Internal (hub) representation of the demo group's kinds.

use foundry_core::ObjectMeta;

use crate::GROUP;

pub const PHASE_PROCESSING: &str = "Processing";
pub const PHASE_READY: &str = "Ready";

pub const CONDITION_WORKER: &str = "Worker";
pub const CONDITION_CONFIG: &str = "Config";

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Foo {
    pub metadata: ObjectMeta,
    pub spec: FooSpec,
    pub status: FooStatus,
}
foundry_core::impl_kind!(Foo, GROUP, "Foo");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FooSpec {
    /// Container image doing the foo work.
    pub image: String,
    pub config: FooConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FooConfig {
    pub msg: String,
    pub msg1: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FooStatus {
    /// Empty, `Processing` or `Ready`.
    pub phase: String,
    pub conditions: Vec<FooCondition>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FooCondition {
    /// `Worker` or `Config`.
    pub type_: String,
    /// `True`, `False` or `Unknown`.
    pub status: String,
}
