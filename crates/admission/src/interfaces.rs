//! Plugin interfaces. Mutating and validating phases are separate traits a
//! plugin opts into through `as_mutating` / `as_validating`.

use foundry_core::{GroupKind, Operation, RequestContext};

use crate::attributes::Attributes;
use crate::errors::AdmissionResult;

/// Common surface of every admission plugin.
pub trait Interface: Send + Sync {
    /// Whether the plugin wants to see this operation at all.
    fn handles(&self, operation: Operation) -> bool;

    /// Whether the plugin wants to see this kind. Defaults to every kind.
    fn handles_kind(&self, _kind: &GroupKind) -> bool { true }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> { None }
    fn as_validating(&self) -> Option<&dyn ValidationInterface> { None }
}

/// May change the candidate object before it is validated and persisted.
#[async_trait::async_trait]
pub trait MutationInterface: Interface {
    async fn admit(&self, ctx: &RequestContext, attrs: &mut Attributes<'_>) -> AdmissionResult<()>;
}

/// Accepts or rejects without modifying anything.
#[async_trait::async_trait]
pub trait ValidationInterface: Interface {
    async fn validate(&self, ctx: &RequestContext, attrs: &Attributes<'_>) -> AdmissionResult<()>;
}
