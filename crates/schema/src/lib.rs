//! Foundry type registry.
//!
//! Maps registered kinds to their resource descriptors, lifecycle strategies and
//! per-version codecs. Built once at startup through [`RegistryBuilder`], then
//! frozen into an immutable [`Registry`] that is shared by `Arc` and passed
//! explicitly to stores and converters.

#![forbid(unsafe_code)]

use std::any::{Any, TypeId};
use std::sync::Arc;

use foundry_core::{ApiError, GroupKind, GroupVersion, GroupVersionKind, Kind, ResourceDescriptor, Strategy};
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

mod codec;

use codec::{Defaulting, ErasedCodec};
pub use codec::VersionCodec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("kind {0} is already registered")]
    AlreadyRegistered(String),
    #[error("no kind {0} is registered")]
    NotFound(String),
    #[error("object has no apiVersion/kind")]
    MissingTypeMeta,
    #[error("registered type for {gvk} does not match the requested type")]
    TypeMismatch { gvk: String },
    #[error("descriptor scope for {0} disagrees with its strategy")]
    ScopeMismatch(String),
    #[error("decoding {gvk}: {message}")]
    Decode { gvk: String, message: String },
    #[error("encoding {gvk}: {message}")]
    Encode { gvk: String, message: String },
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(ref gvk) => ApiError::not_found("kinds", gvk.clone()),
            RegistryError::AlreadyRegistered(ref gvk) => ApiError::already_exists("kinds", gvk.clone()),
            RegistryError::MissingTypeMeta | RegistryError::Decode { .. } => ApiError::bad_request(e.to_string()),
            RegistryError::TypeMismatch { .. } | RegistryError::ScopeMismatch(_) | RegistryError::Encode { .. } => {
                ApiError::internal(e.to_string())
            }
        }
    }
}

struct Registration {
    descriptor: Arc<ResourceDescriptor>,
    codec: Arc<dyn ErasedCodec>,
    /// Holds an `Arc<dyn Strategy<T>>` for the registered internal type `T`.
    strategy: Arc<dyn Any + Send + Sync>,
}

/// Write phase of the registry. Not shared; consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    kinds: FxHashMap<GroupVersionKind, Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self { Self::default() }

    /// Register one external version of internal kind `T`.
    ///
    /// The strategy factory runs once, here. Fails if the (group, version, kind)
    /// tuple is taken, if the descriptor does not name `T`'s group/kind, or if
    /// the descriptor scope disagrees with the strategy.
    pub fn register<T, E, S, F>(
        &mut self,
        descriptor: ResourceDescriptor,
        strategy_factory: F,
        codec: VersionCodec<T, E>,
    ) -> Result<&mut Self, RegistryError>
    where
        T: Kind,
        E: Serialize + DeserializeOwned + 'static,
        S: Strategy<T> + 'static,
        F: FnOnce() -> S,
    {
        let gvk = descriptor.gvk();
        if self.kinds.contains_key(&gvk) {
            return Err(RegistryError::AlreadyRegistered(gvk.to_string()));
        }
        if descriptor.group_kind() != T::static_group_kind() {
            return Err(RegistryError::TypeMismatch { gvk: gvk.to_string() });
        }
        let strategy: Arc<dyn Strategy<T>> = Arc::new(strategy_factory());
        if strategy.namespace_scoped() != descriptor.namespaced {
            return Err(RegistryError::ScopeMismatch(gvk.to_string()));
        }
        debug!(gvk = %gvk, plural = %descriptor.plural, namespaced = descriptor.namespaced, "registry: kind registered");
        self.kinds.insert(
            gvk,
            Registration { descriptor: Arc::new(descriptor), codec: Arc::new(codec), strategy: Arc::new(strategy) },
        );
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry { kinds: self.kinds }
    }
}

/// Read-only registry of served kinds; safe for unsynchronized concurrent reads.
pub struct Registry {
    kinds: FxHashMap<GroupVersionKind, Registration>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

    fn registration(&self, gvk: &GroupVersionKind) -> Result<&Registration, RegistryError> {
        self.kinds.get(gvk).ok_or_else(|| RegistryError::NotFound(gvk.to_string()))
    }

    pub fn resolve(&self, gvk: &GroupVersionKind) -> Result<Arc<ResourceDescriptor>, RegistryError> {
        Ok(self.registration(gvk)?.descriptor.clone())
    }

    /// Resolve by plural resource name, as the transport layer routes requests.
    pub fn resolve_resource(&self, group: &str, version: &str, plural: &str) -> Result<Arc<ResourceDescriptor>, RegistryError> {
        self.kinds
            .values()
            .map(|r| &r.descriptor)
            .find(|d| d.group == group && d.version == version && d.plural == plural)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("{}/{}/{}", group, version, plural)))
    }

    /// All descriptors, ordered by (group, version, kind).
    pub fn kinds(&self) -> Vec<Arc<ResourceDescriptor>> {
        let mut out: Vec<_> = self.kinds.values().map(|r| r.descriptor.clone()).collect();
        out.sort_by(|a, b| a.gvk().cmp(&b.gvk()));
        out
    }

    /// Registered external versions of a group/kind, sorted.
    pub fn versions_of(&self, gk: &GroupKind) -> Vec<String> {
        let mut out: Vec<_> = self.kinds.keys().filter(|k| &k.group_kind() == gk).map(|k| k.version.clone()).collect();
        out.sort();
        out
    }

    pub fn strategy<T: Kind>(&self, gvk: &GroupVersionKind) -> Result<Arc<dyn Strategy<T>>, RegistryError> {
        self.registration(gvk)?
            .strategy
            .downcast_ref::<Arc<dyn Strategy<T>>>()
            .cloned()
            .ok_or_else(|| RegistryError::TypeMismatch { gvk: gvk.to_string() })
    }

    /// Decode external JSON into the internal form, applying defaults once.
    pub fn decode<T: Kind>(&self, value: serde_json::Value) -> Result<T, RegistryError> {
        self.decode_with::<T>(value, Defaulting::Apply)
    }

    /// Decode without defaulting; used for objects read back from storage.
    pub fn decode_stored<T: Kind>(&self, value: serde_json::Value) -> Result<T, RegistryError> {
        self.decode_with::<T>(value, Defaulting::Skip)
    }

    fn decode_with<T: Kind>(&self, value: serde_json::Value, defaulting: Defaulting) -> Result<T, RegistryError> {
        let gvk = type_meta(&value)?;
        let reg = self.registration(&gvk)?;
        if reg.codec.internal_type() != TypeId::of::<T>() {
            return Err(RegistryError::TypeMismatch { gvk: gvk.to_string() });
        }
        let boxed = reg.codec.decode(&gvk, value, defaulting)?;
        boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| RegistryError::TypeMismatch { gvk: gvk.to_string() })
    }

    /// Encode an internal object as the given external version of its kind.
    pub fn encode<T: Kind>(&self, obj: &T, version: &str) -> Result<serde_json::Value, RegistryError> {
        let gvk = GroupVersionKind::new(T::GROUP, version, T::KIND);
        self.registration(&gvk)?.codec.encode(&gvk, obj.as_any())
    }

    /// Convert external JSON of one registered version into another version of the same kind.
    pub fn convert(&self, value: serde_json::Value, target_version: &str) -> Result<serde_json::Value, RegistryError> {
        let source = type_meta(&value)?;
        let target = GroupVersionKind::new(&source.group, target_version, &source.kind);
        let from = self.registration(&source)?;
        let to = self.registration(&target)?;
        if from.codec.internal_type() != to.codec.internal_type() {
            return Err(RegistryError::TypeMismatch { gvk: target.to_string() });
        }
        let internal = from.codec.decode(&source, value, Defaulting::Skip)?;
        to.codec.encode(&target, internal.as_ref())
    }
}

/// Read `apiVersion` and `kind` from an external object.
pub fn type_meta(value: &serde_json::Value) -> Result<GroupVersionKind, RegistryError> {
    let api_version = value.get("apiVersion").and_then(|v| v.as_str()).ok_or(RegistryError::MissingTypeMeta)?;
    let kind = value.get("kind").and_then(|v| v.as_str()).filter(|k| !k.is_empty()).ok_or(RegistryError::MissingTypeMeta)?;
    let gv = GroupVersion::parse(api_version).ok_or(RegistryError::MissingTypeMeta)?;
    Ok(gv.with_kind(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_core::{FieldErrorList, ObjectMeta};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Widget {
        metadata: ObjectMeta,
        size: i64,
    }
    foundry_core::impl_kind!(Widget, "toys.example.com", "Widget");

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct WidgetV1 {
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        size: i64,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct WidgetV2 {
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        size_cm: i64,
    }

    struct Noop(bool);

    impl Strategy<Widget> for Noop {
        fn namespace_scoped(&self) -> bool { self.0 }
        fn prepare_for_create(&self, _obj: &mut Widget) {}
        fn prepare_for_update(&self, _obj: &mut Widget, _old: &Widget) {}
        fn validate(&self, _obj: &Widget) -> FieldErrorList { Vec::new() }
        fn validate_update(&self, _obj: &Widget, _old: &Widget) -> FieldErrorList { Vec::new() }
        fn canonicalize(&self, _obj: &mut Widget) {}
        fn allow_create_on_update(&self) -> bool { false }
        fn allow_unconditional_update(&self) -> bool { false }
        fn generate_name(&self, base: &str) -> String { format!("{}x", base) }
        fn warnings_on_create(&self, _obj: &Widget) -> Vec<String> { Vec::new() }
        fn warnings_on_update(&self, _obj: &Widget, _old: &Widget) -> Vec<String> { Vec::new() }
    }

    fn v1_codec() -> VersionCodec<Widget, WidgetV1> {
        VersionCodec::new(
            |e: WidgetV1| Widget { metadata: e.metadata, size: e.size },
            |i: &Widget| WidgetV1 { metadata: i.metadata.clone(), size: i.size },
        )
        .with_defaults(|e| if e.size == 0 { e.size = 1 })
    }

    fn v2_codec() -> VersionCodec<Widget, WidgetV2> {
        VersionCodec::new(
            |e: WidgetV2| Widget { metadata: e.metadata, size: e.size_cm / 10 },
            |i: &Widget| WidgetV2 { metadata: i.metadata.clone(), size_cm: i.size * 10 },
        )
    }

    fn descriptor(version: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("toys.example.com", version, "Widget", "widgets", true)
    }

    fn registry() -> Registry {
        let mut b = Registry::builder();
        b.register(descriptor("v1"), || Noop(true), v1_codec()).unwrap();
        b.register(descriptor("v2"), || Noop(true), v2_codec()).unwrap();
        b.build()
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut b = Registry::builder();
        b.register(descriptor("v1"), || Noop(true), v1_codec()).unwrap();
        let err = b.register(descriptor("v1"), || Noop(true), v1_codec()).err();
        assert_eq!(err, Some(RegistryError::AlreadyRegistered("toys.example.com/v1/Widget".into())));
    }

    #[test]
    fn scope_mismatch_fails() {
        let mut b = Registry::builder();
        let err = b.register(descriptor("v1"), || Noop(false), v1_codec()).err();
        assert!(matches!(err, Some(RegistryError::ScopeMismatch(_))));
    }

    #[test]
    fn resolve_known_and_unknown() {
        let reg = registry();
        let d = reg.resolve(&GroupVersionKind::new("toys.example.com", "v2", "Widget")).unwrap();
        assert_eq!(d.plural, "widgets");
        assert!(matches!(
            reg.resolve(&GroupVersionKind::new("toys.example.com", "v3", "Widget")),
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(reg.resolve_resource("toys.example.com", "v1", "widgets").unwrap().version, "v1");
        assert_eq!(reg.versions_of(&GroupKind::new("toys.example.com", "Widget")), vec!["v1", "v2"]);
        assert_eq!(reg.kinds().len(), 2);
    }

    #[test]
    fn decode_applies_defaults_once_and_stored_skips_them() {
        let reg = registry();
        let wire = serde_json::json!({"apiVersion": "toys.example.com/v1", "kind": "Widget", "metadata": {"name": "w"}});
        let w: Widget = reg.decode(wire.clone()).unwrap();
        assert_eq!(w.size, 1);
        let stored: Widget = reg.decode_stored(wire).unwrap();
        assert_eq!(stored.size, 0);
    }

    #[test]
    fn decode_requires_type_meta() {
        let reg = registry();
        let err = reg.decode::<Widget>(serde_json::json!({"metadata": {"name": "w"}})).err();
        assert_eq!(err, Some(RegistryError::MissingTypeMeta));
    }

    #[test]
    fn round_trip_between_versions() {
        let reg = registry();
        let w = Widget { metadata: ObjectMeta { name: Some("w".into()), ..Default::default() }, size: 3 };
        for version in ["v1", "v2"] {
            let ext = reg.encode(&w, version).unwrap();
            assert_eq!(ext["apiVersion"], format!("toys.example.com/{}", version));
            let back: Widget = reg.decode_stored(ext.clone()).unwrap();
            assert_eq!(back, w);
            let again = reg.encode(&back, version).unwrap();
            assert_eq!(again, ext);
        }
        let v2 = reg.convert(reg.encode(&w, "v1").unwrap(), "v2").unwrap();
        assert_eq!(v2["sizeCm"], 30);
        let v1 = reg.convert(v2, "v1").unwrap();
        assert_eq!(v1["size"], 3);
    }

    #[test]
    fn typed_strategy_lookup() {
        let reg = registry();
        let s = reg.strategy::<Widget>(&GroupVersionKind::new("toys.example.com", "v1", "Widget")).unwrap();
        assert!(s.namespace_scoped());
        assert_eq!(s.generate_name("w-"), "w-x");
    }
}
