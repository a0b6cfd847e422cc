//! Explicit default strategy and name generation.

use foundry_core::{FieldErrorList, Kind, Strategy};

use crate::validation::{validate_object_meta, validate_object_meta_update};

const NAME_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const MAX_NAME_LENGTH: usize = 63;
const RANDOM_LENGTH: usize = 5;
const MAX_GENERATED_BASE: usize = MAX_NAME_LENGTH - RANDOM_LENGTH;

pub trait NameGenerator: Send + Sync {
    fn generate_name(&self, base: &str) -> String;
}

/// `base` (truncated to 58 bytes) followed by five random characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNameGenerator;

impl NameGenerator for SimpleNameGenerator {
    fn generate_name(&self, base: &str) -> String {
        let mut cut = base.len().min(MAX_GENERATED_BASE);
        while !base.is_char_boundary(cut) { cut -= 1; }
        let random = uuid::Uuid::new_v4();
        let suffix: String = random
            .as_bytes()
            .iter()
            .take(RANDOM_LENGTH)
            .map(|b| NAME_ALPHABET[*b as usize % NAME_ALPHABET.len()] as char)
            .collect();
        format!("{}{}", &base[..cut], suffix)
    }
}

/// No-op lifecycle policy plus generic metadata validation. Concrete strategies
/// hold one and delegate the hooks they have nothing to add to.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStrategy {
    namespaced: bool,
    create_on_update: bool,
    unconditional_update: bool,
}

impl DefaultStrategy {
    pub fn namespaced() -> Self { Self { namespaced: true, create_on_update: false, unconditional_update: false } }
    pub fn cluster_scoped() -> Self { Self { namespaced: false, ..Self::namespaced() } }

    pub fn with_create_on_update(mut self, allow: bool) -> Self {
        self.create_on_update = allow;
        self
    }

    pub fn with_unconditional_update(mut self, allow: bool) -> Self {
        self.unconditional_update = allow;
        self
    }
}

impl<T: Kind> Strategy<T> for DefaultStrategy {
    fn namespace_scoped(&self) -> bool { self.namespaced }
    fn prepare_for_create(&self, _obj: &mut T) {}
    fn prepare_for_update(&self, _obj: &mut T, _old: &T) {}
    fn validate(&self, obj: &T) -> FieldErrorList { validate_object_meta(obj.meta(), self.namespaced) }
    fn validate_update(&self, obj: &T, old: &T) -> FieldErrorList { validate_object_meta_update(obj.meta(), old.meta()) }
    fn canonicalize(&self, _obj: &mut T) {}
    fn allow_create_on_update(&self) -> bool { self.create_on_update }
    fn allow_unconditional_update(&self) -> bool { self.unconditional_update }
    fn generate_name(&self, base: &str) -> String { SimpleNameGenerator.generate_name(base) }
    fn warnings_on_create(&self, _obj: &T) -> Vec<String> { Vec::new() }
    fn warnings_on_update(&self, _obj: &T, _old: &T) -> Vec<String> { Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_keep_base_and_alphabet() {
        let name = SimpleNameGenerator.generate_name("foo-");
        assert_eq!(name.len(), 9);
        assert!(name.starts_with("foo-"));
        assert!(name[4..].bytes().all(|b| NAME_ALPHABET.contains(&b)));
    }

    #[test]
    fn long_base_is_truncated() {
        let name = SimpleNameGenerator.generate_name(&"x".repeat(100));
        assert_eq!(name.len(), MAX_NAME_LENGTH);
        assert!(name.starts_with(&"x".repeat(58)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let base = format!("{}é", "a".repeat(57));
        let name = SimpleNameGenerator.generate_name(&base);
        assert!(name.starts_with(&"a".repeat(57)));
        assert_eq!(name.chars().count(), 62);
    }
}
