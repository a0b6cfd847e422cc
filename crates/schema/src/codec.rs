//! Typed conversion between one external version and the internal representation,
//! erased so the registry can hold codecs for unrelated kinds side by side.

use std::any::{Any, TypeId};

use foundry_core::GroupVersionKind;
use serde::{de::DeserializeOwned, Serialize};

use crate::RegistryError;

/// Conversion functions for one external version `E` of internal kind `I`.
pub struct VersionCodec<I, E> {
    to_internal: fn(E) -> I,
    from_internal: fn(&I) -> E,
    defaulter: Option<fn(&mut E)>,
}

impl<I, E> VersionCodec<I, E> {
    pub fn new(to_internal: fn(E) -> I, from_internal: fn(&I) -> E) -> Self {
        Self { to_internal, from_internal, defaulter: None }
    }

    /// Default function applied once, on external -> internal conversion.
    pub fn with_defaults(mut self, defaulter: fn(&mut E)) -> Self {
        self.defaulter = Some(defaulter);
        self
    }
}

impl<I: Clone> VersionCodec<I, I> {
    /// Codec for a version whose wire shape is the internal shape.
    pub fn identity() -> Self {
        Self { to_internal: |e| e, from_internal: |i| i.clone(), defaulter: None }
    }
}

/// Whether decoding applies the registered default function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Defaulting {
    Apply,
    Skip,
}

pub(crate) trait ErasedCodec: Send + Sync {
    fn internal_type(&self) -> TypeId;
    fn decode(&self, gvk: &GroupVersionKind, value: serde_json::Value, defaulting: Defaulting) -> Result<Box<dyn Any + Send>, RegistryError>;
    fn encode(&self, gvk: &GroupVersionKind, internal: &dyn Any) -> Result<serde_json::Value, RegistryError>;
}

impl<I, E> ErasedCodec for VersionCodec<I, E>
where
    I: Any + Send,
    E: Serialize + DeserializeOwned + 'static,
{
    fn internal_type(&self) -> TypeId { TypeId::of::<I>() }

    fn decode(&self, gvk: &GroupVersionKind, mut value: serde_json::Value, defaulting: Defaulting) -> Result<Box<dyn Any + Send>, RegistryError> {
        if let Some(map) = value.as_object_mut() {
            map.remove("apiVersion");
            map.remove("kind");
        }
        let mut external: E = serde_json::from_value(value)
            .map_err(|e| RegistryError::Decode { gvk: gvk.to_string(), message: e.to_string() })?;
        if defaulting == Defaulting::Apply {
            if let Some(defaulter) = self.defaulter { defaulter(&mut external); }
        }
        Ok(Box::new((self.to_internal)(external)))
    }

    fn encode(&self, gvk: &GroupVersionKind, internal: &dyn Any) -> Result<serde_json::Value, RegistryError> {
        let obj = internal.downcast_ref::<I>().ok_or_else(|| RegistryError::TypeMismatch { gvk: gvk.to_string() })?;
        let external = (self.from_internal)(obj);
        let mut value = serde_json::to_value(&external)
            .map_err(|e| RegistryError::Encode { gvk: gvk.to_string(), message: e.to_string() })?;
        match value.as_object_mut() {
            Some(map) => {
                map.insert("apiVersion".into(), serde_json::Value::String(gvk.group_version().api_version()));
                map.insert("kind".into(), serde_json::Value::String(gvk.kind.clone()));
            }
            None => return Err(RegistryError::Encode { gvk: gvk.to_string(), message: "external form is not a JSON object".into() }),
        }
        Ok(value)
    }
}
