//! Lifecycle policy for Foo.

use foundry_core::{FieldError, FieldErrorList, Strategy};
use foundry_store::DefaultStrategy;

use crate::types::{Foo, FooStatus};

/// Namespace-scoped; status is system-owned and never written through create
/// or update, `spec.image` is required.
#[derive(Debug, Clone, Copy)]
pub struct FooStrategy {
    base: DefaultStrategy,
}

impl FooStrategy {
    pub fn new() -> Self { Self { base: DefaultStrategy::namespaced() } }
}

impl Default for FooStrategy {
    fn default() -> Self { Self::new() }
}

fn validate_spec(obj: &Foo, errs: &mut FieldErrorList) {
    if obj.spec.image.trim().is_empty() {
        errs.push(FieldError::required("spec.image", "a container image is required"));
    }
}

impl Strategy<Foo> for FooStrategy {
    fn namespace_scoped(&self) -> bool { true }

    fn prepare_for_create(&self, obj: &mut Foo) {
        obj.status = FooStatus::default();
    }

    fn prepare_for_update(&self, obj: &mut Foo, old: &Foo) {
        obj.status = old.status.clone();
    }

    fn validate(&self, obj: &Foo) -> FieldErrorList {
        let mut errs = self.base.validate(obj);
        validate_spec(obj, &mut errs);
        errs
    }

    fn validate_update(&self, obj: &Foo, old: &Foo) -> FieldErrorList {
        let mut errs = self.base.validate_update(obj, old);
        validate_spec(obj, &mut errs);
        errs
    }

    fn canonicalize(&self, obj: &mut Foo) {
        obj.spec.image = obj.spec.image.trim().to_string();
    }

    fn allow_create_on_update(&self) -> bool { false }
    fn allow_unconditional_update(&self) -> bool { false }
    fn generate_name(&self, base: &str) -> String { Strategy::<Foo>::generate_name(&self.base, base) }
    fn warnings_on_create(&self, _obj: &Foo) -> Vec<String> { Vec::new() }
    fn warnings_on_update(&self, _obj: &Foo, _old: &Foo) -> Vec<String> { Vec::new() }
}
