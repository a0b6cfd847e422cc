//! Per-kind lifecycle policy consulted by the generic store.

use crate::FieldErrorList;

/// Lifecycle hooks for one registered kind. Stateless; invoked per operation.
///
/// There are no default method bodies: a strategy that has nothing to add for a
/// hook delegates to an explicit default (see `foundry_store::DefaultStrategy`).
pub trait Strategy<T>: Send + Sync {
    /// Static classification; must agree with the registered descriptor.
    fn namespace_scoped(&self) -> bool;

    /// Clear or stamp fields a client must not set on create (status, system metadata).
    fn prepare_for_create(&self, obj: &mut T);

    /// Carry system-owned fields over from `old` so the client cannot override them.
    fn prepare_for_update(&self, obj: &mut T, old: &T);

    fn validate(&self, obj: &T) -> FieldErrorList;

    /// Must also reject changes to immutable fields.
    fn validate_update(&self, obj: &T, old: &T) -> FieldErrorList;

    /// Normalize representation so semantically equal objects compare equal.
    fn canonicalize(&self, obj: &mut T);

    fn allow_create_on_update(&self) -> bool;

    /// Whether an update without a caller-supplied resource version is accepted.
    fn allow_unconditional_update(&self) -> bool;

    /// Produce a concrete name from `metadata.generateName`.
    fn generate_name(&self, base: &str) -> String;

    fn warnings_on_create(&self, obj: &T) -> Vec<String>;
    fn warnings_on_update(&self, obj: &T, old: &T) -> Vec<String>;
}
