#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use foundry_core::{
    ApiError, ApiResult, FieldError, FieldErrorList, GroupVersionKind, Kind, ObjectMeta, Operation, RequestContext,
    ResourceDescriptor, Strategy,
};
use foundry_schema::{Registry, VersionCodec};
use foundry_store::{AdmissionHook, AdmissionRequest, DefaultStrategy, MemoryBackend, Store};
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "toys.example.com";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetSpec {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gadget {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: GadgetSpec,
}
foundry_core::impl_kind!(Gadget, GROUP, "Gadget");

/// Cluster-scoped; tolerates unconditional updates and create-on-update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub slots: u32,
}
foundry_core::impl_kind!(Shelf, GROUP, "Shelf");

pub struct GadgetStrategy(DefaultStrategy);

impl Strategy<Gadget> for GadgetStrategy {
    fn namespace_scoped(&self) -> bool { Strategy::<Gadget>::namespace_scoped(&self.0) }
    fn prepare_for_create(&self, obj: &mut Gadget) { self.0.prepare_for_create(obj) }
    fn prepare_for_update(&self, obj: &mut Gadget, old: &Gadget) { self.0.prepare_for_update(obj, old) }
    fn validate(&self, obj: &Gadget) -> FieldErrorList {
        let mut errs = self.0.validate(obj);
        if obj.spec.color.is_empty() {
            errs.push(FieldError::required("spec.color", ""));
        }
        errs
    }
    fn validate_update(&self, obj: &Gadget, old: &Gadget) -> FieldErrorList {
        let mut errs = self.0.validate_update(obj, old);
        errs.extend(self.validate(obj).into_iter().filter(|e| e.field.starts_with("spec.")));
        errs
    }
    fn canonicalize(&self, obj: &mut Gadget) { obj.spec.color = obj.spec.color.to_lowercase() }
    fn allow_create_on_update(&self) -> bool { Strategy::<Gadget>::allow_create_on_update(&self.0) }
    fn allow_unconditional_update(&self) -> bool { Strategy::<Gadget>::allow_unconditional_update(&self.0) }
    fn generate_name(&self, base: &str) -> String { Strategy::<Gadget>::generate_name(&self.0, base) }
    fn warnings_on_create(&self, obj: &Gadget) -> Vec<String> {
        if obj.spec.count > 100 { vec!["spec.count above 100 is deprecated".into()] } else { Vec::new() }
    }
    fn warnings_on_update(&self, obj: &Gadget, _old: &Gadget) -> Vec<String> { self.warnings_on_create(obj) }
}

pub fn gadget_gvk() -> GroupVersionKind { GroupVersionKind::new(GROUP, "v1", "Gadget") }
pub fn shelf_gvk() -> GroupVersionKind { GroupVersionKind::new(GROUP, "v1", "Shelf") }

pub fn registry() -> Arc<Registry> {
    let mut b = Registry::builder();
    b.register(
        ResourceDescriptor::new(GROUP, "v1", "Gadget", "gadgets", true),
        || GadgetStrategy(DefaultStrategy::namespaced()),
        VersionCodec::<Gadget, Gadget>::identity(),
    )
    .unwrap();
    b.register(
        ResourceDescriptor::new(GROUP, "v1", "Shelf", "shelves", false),
        || DefaultStrategy::cluster_scoped().with_unconditional_update(true).with_create_on_update(true),
        VersionCodec::<Shelf, Shelf>::identity(),
    )
    .unwrap();
    Arc::new(b.build())
}

pub fn gadgets(backend: Arc<MemoryBackend>) -> Store<Gadget> {
    Store::new(registry(), &gadget_gvk(), backend, "/registry/test").unwrap()
}

pub fn shelves(backend: Arc<MemoryBackend>) -> Store<Shelf> {
    Store::new(registry(), &shelf_gvk(), backend, "/registry/test").unwrap()
}

pub fn gadget(name: &str, color: &str) -> Gadget {
    Gadget { metadata: ObjectMeta { name: Some(name.into()), ..Default::default() }, spec: GadgetSpec { color: color.into(), count: 1 } }
}

pub fn labelled(mut g: Gadget, labels: &[(&str, &str)]) -> Gadget {
    g.metadata.labels = Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>());
    g
}

pub fn ns(namespace: &str) -> RequestContext { RequestContext::new().with_namespace(namespace) }

/// Records every admission call; optionally rejects one operation.
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<(Operation, String, bool, bool)>>,
    pub reject: Option<Operation>,
    pub stamp_label: bool,
}

#[async_trait::async_trait]
impl<T: Kind> AdmissionHook<T> for Recorder {
    async fn admit(&self, _ctx: &RequestContext, req: AdmissionRequest<'_, T>) -> ApiResult<()> {
        self.calls.lock().unwrap().push((req.operation, req.name.to_string(), req.object.is_some(), req.old.is_some()));
        if self.reject == Some(req.operation) {
            return Err(ApiError::forbidden(req.descriptor.qualified_resource(), req.name, "denied by recorder"));
        }
        if self.stamp_label {
            if let Some(obj) = req.object {
                obj.meta_mut().labels.get_or_insert_with(Default::default).insert("admitted".into(), "true".into());
            }
        }
        Ok(())
    }
}
