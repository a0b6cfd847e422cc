//! Built-in plugins.

use std::sync::Arc;

use foundry_core::{Operation, RequestContext};

use crate::attributes::Attributes;
use crate::errors::{AdmissionError, AdmissionResult};
use crate::handler::Handler;
use crate::interfaces::{Interface, MutationInterface, ValidationInterface};
use crate::plugins::Plugins;

pub const ALWAYS_ADMIT: &str = "AlwaysAdmit";
pub const ALWAYS_DENY: &str = "AlwaysDeny";

/// Admits every request.
pub struct AlwaysAdmit {
    handler: Handler,
}

impl AlwaysAdmit {
    pub fn new() -> Self { Self { handler: Handler::new_all() } }
}

impl Default for AlwaysAdmit {
    fn default() -> Self { Self::new() }
}

impl Interface for AlwaysAdmit {
    fn handles(&self, operation: Operation) -> bool { self.handler.handles(operation) }
    fn as_mutating(&self) -> Option<&dyn MutationInterface> { Some(self) }
    fn as_validating(&self) -> Option<&dyn ValidationInterface> { Some(self) }
}

#[async_trait::async_trait]
impl MutationInterface for AlwaysAdmit {
    async fn admit(&self, _ctx: &RequestContext, _attrs: &mut Attributes<'_>) -> AdmissionResult<()> { Ok(()) }
}

#[async_trait::async_trait]
impl ValidationInterface for AlwaysAdmit {
    async fn validate(&self, _ctx: &RequestContext, _attrs: &Attributes<'_>) -> AdmissionResult<()> { Ok(()) }
}

/// Rejects every request. Useful for locking a server down and in tests.
pub struct AlwaysDeny {
    handler: Handler,
}

impl AlwaysDeny {
    pub fn new() -> Self { Self { handler: Handler::new_all() } }
}

impl Default for AlwaysDeny {
    fn default() -> Self { Self::new() }
}

impl Interface for AlwaysDeny {
    fn handles(&self, operation: Operation) -> bool { self.handler.handles(operation) }
    fn as_mutating(&self) -> Option<&dyn MutationInterface> { Some(self) }
    fn as_validating(&self) -> Option<&dyn ValidationInterface> { Some(self) }
}

#[async_trait::async_trait]
impl MutationInterface for AlwaysDeny {
    async fn admit(&self, _ctx: &RequestContext, _attrs: &mut Attributes<'_>) -> AdmissionResult<()> {
        Err(AdmissionError::denied("admission control is denying all modifications"))
    }
}

#[async_trait::async_trait]
impl ValidationInterface for AlwaysDeny {
    async fn validate(&self, _ctx: &RequestContext, _attrs: &Attributes<'_>) -> AdmissionResult<()> {
        Err(AdmissionError::denied("admission control is denying all modifications"))
    }
}

/// Register `AlwaysAdmit` and `AlwaysDeny`.
pub fn register(plugins: &mut Plugins) -> AdmissionResult<()> {
    plugins.register(ALWAYS_ADMIT, |_| Ok(Arc::new(AlwaysAdmit::new()) as Arc<dyn Interface>))?;
    plugins.register(ALWAYS_DENY, |_| Ok(Arc::new(AlwaysDeny::new()) as Arc<dyn Interface>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_core::ResourceDescriptor;

    #[tokio::test]
    async fn always_admit_admits() {
        let d = ResourceDescriptor::new("g", "v1", "K", "ks", true);
        let mut attrs = Attributes::new(Operation::Create, &d, "ns", "a");
        let plugin = AlwaysAdmit::new();
        assert!(plugin.handles(Operation::Connect));
        assert!(plugin.admit(&RequestContext::new(), &mut attrs).await.is_ok());
        assert!(plugin.validate(&RequestContext::new(), &attrs).await.is_ok());
    }

    #[tokio::test]
    async fn always_deny_denies() {
        let d = ResourceDescriptor::new("g", "v1", "K", "ks", true);
        let mut attrs = Attributes::new(Operation::Delete, &d, "ns", "a");
        let plugin = AlwaysDeny::new();
        assert!(matches!(plugin.admit(&RequestContext::new(), &mut attrs).await, Err(AdmissionError::Denied(_))));
        assert!(plugin.validate(&RequestContext::new(), &attrs).await.is_err());
    }

    #[test]
    fn builtins_register() {
        let mut plugins = Plugins::new();
        register(&mut plugins).unwrap();
        assert_eq!(plugins.registered_names(), vec![ALWAYS_ADMIT.to_string(), ALWAYS_DENY.to_string()]);
    }
}
