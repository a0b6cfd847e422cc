//! Operation and kind filters for plugins to embed.

use std::collections::HashSet;

use foundry_core::{GroupKind, Operation};

use crate::interfaces::Interface;

#[derive(Debug, Clone)]
pub struct Handler {
    operations: HashSet<Operation>,
    /// `None` handles every kind.
    kinds: Option<Vec<GroupKind>>,
}

impl Handler {
    pub fn new(operations: &[Operation]) -> Self {
        Self { operations: operations.iter().copied().collect(), kinds: None }
    }

    pub fn new_create_update() -> Self { Self::new(&[Operation::Create, Operation::Update]) }

    pub fn new_all() -> Self {
        Self::new(&[Operation::Create, Operation::Update, Operation::Delete, Operation::Connect])
    }

    /// Restrict to the given kinds.
    pub fn with_kinds(mut self, kinds: &[GroupKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }
}

impl Interface for Handler {
    fn handles(&self, operation: Operation) -> bool { self.operations.contains(&operation) }

    fn handles_kind(&self, kind: &GroupKind) -> bool {
        self.kinds.as_ref().map(|ks| ks.contains(kind)).unwrap_or(true)
    }
}
