//! Uniform verb set over external-version JSON, backed by a typed generic store.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde_json::{json, Value};
use tracing::{debug, info};

use foundry_core::{ApiError, ApiResult, Kind, RequestContext, ResourceDescriptor};
use foundry_schema::{type_meta, Registry};
use foundry_store::{
    AdmissionHook, CreateOptions, DeleteOptions, ListOptions, NoAdmission, Replace, Store, UpdateOptions, WatchEvent,
    WatchOptions, WriteResult,
};

use crate::status::status_json;

/// Object returned by a write, plus what the transport needs to shape the response.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResponse {
    pub object: Value,
    /// Set when the write created the object (201 rather than 200).
    pub created: bool,
    pub warnings: Vec<String>,
}

impl WriteResponse {
    pub fn code(&self) -> u16 { if self.created { 201 } else { 200 } }
}

/// `{type, object}` watch frames; an `ERROR` frame carries a `Status` and ends the stream.
pub type EventStream = BoxStream<'static, Value>;

/// The verb set the transport layer dispatches to, one instance per served
/// (group, version, resource).
#[async_trait::async_trait]
pub trait RestStorage: Send + Sync {
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Version objects are rendered in.
    fn version(&self) -> &str;

    async fn create(&self, ctx: &RequestContext, body: Value, opts: &CreateOptions) -> ApiResult<WriteResponse>;

    /// Replace `name` with `body`; creates when the kind allows it.
    async fn update(&self, ctx: &RequestContext, name: &str, body: Value, opts: &UpdateOptions) -> ApiResult<WriteResponse>;

    /// Returns the object as it was before deletion.
    async fn delete(&self, ctx: &RequestContext, name: &str, opts: &DeleteOptions) -> ApiResult<Value>;

    async fn get(&self, ctx: &RequestContext, name: &str) -> ApiResult<Value>;

    /// A `<Kind>List` object.
    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> ApiResult<Value>;

    async fn watch(&self, ctx: &RequestContext, opts: &WatchOptions) -> ApiResult<EventStream>;
}

/// [`RestStorage`] for internal kind `T`.
pub struct Rest<T: Kind> {
    store: Store<T>,
    admission: Arc<dyn AdmissionHook<T>>,
    descriptor: ResourceDescriptor,
    version: String,
}

impl<T: Kind> Rest<T> {
    /// Serve `store` in its storage version with no admission.
    pub fn new(store: Store<T>) -> Self {
        let descriptor = (**store.descriptor()).clone();
        let version = descriptor.version.clone();
        Self { store, admission: Arc::new(NoAdmission), descriptor, version }
    }

    pub fn with_admission(mut self, admission: Arc<dyn AdmissionHook<T>>) -> Self {
        self.admission = admission;
        self
    }

    /// Serve another registered version of the same kind. Storage is unaffected.
    pub fn with_version(mut self, version: &str) -> ApiResult<Self> {
        let gvk = foundry_core::GroupVersionKind::new(&self.descriptor.group, version, &self.descriptor.kind);
        self.descriptor = (*self.store.registry().resolve(&gvk)?).clone();
        self.version = version.to_string();
        Ok(self)
    }

    pub fn store(&self) -> &Store<T> { &self.store }

    /// Decode a request body into the internal form. Missing type meta is
    /// filled from the endpoint; a body of another kind is rejected.
    fn decode(&self, mut body: Value) -> ApiResult<T> {
        let map = body.as_object_mut().ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))?;
        let blank = |v: Option<&Value>| v.and_then(Value::as_str).map_or(true, str::is_empty);
        if blank(map.get("apiVersion")) {
            map.insert("apiVersion".into(), Value::String(self.descriptor.group_version().api_version()));
        }
        if blank(map.get("kind")) {
            map.insert("kind".into(), Value::String(self.descriptor.kind.clone()));
        }
        let gvk = type_meta(&body)?;
        if gvk.group != self.descriptor.group || gvk.kind != self.descriptor.kind {
            return Err(ApiError::bad_request(format!(
                "{} in the request body does not match the resource {}",
                gvk,
                self.descriptor.qualified_resource()
            )));
        }
        Ok(self.store.registry().decode::<T>(body)?)
    }

    fn encode(&self, obj: &T) -> ApiResult<Value> {
        Ok(self.store.registry().encode(obj, &self.version)?)
    }

    fn write_response(&self, res: WriteResult<T>) -> ApiResult<WriteResponse> {
        Ok(WriteResponse { object: self.encode(&res.object)?, created: res.created, warnings: res.warnings })
    }
}

fn event_frame(registry: &Registry, version: &str, event: ApiResult<WatchEvent<impl Kind>>) -> Value {
    let event = match event {
        Ok(ev) => ev,
        Err(e) => return json!({ "type": "ERROR", "object": status_json(&e) }),
    };
    match registry.encode(event.object(), version) {
        Ok(object) => json!({ "type": event.type_str(), "object": object }),
        Err(e) => json!({ "type": "ERROR", "object": status_json(&ApiError::from(e)) }),
    }
}

#[async_trait::async_trait]
impl<T: Kind> RestStorage for Rest<T> {
    fn descriptor(&self) -> &ResourceDescriptor { &self.descriptor }
    fn version(&self) -> &str { &self.version }

    async fn create(&self, ctx: &RequestContext, body: Value, opts: &CreateOptions) -> ApiResult<WriteResponse> {
        let obj = self.decode(body)?;
        let res = self.store.create(ctx, obj, self.admission.as_ref(), opts).await?;
        self.write_response(res)
    }

    async fn update(&self, ctx: &RequestContext, name: &str, body: Value, opts: &UpdateOptions) -> ApiResult<WriteResponse> {
        let obj = self.decode(body)?;
        let res = self.store.update(ctx, name, &Replace(obj), self.admission.as_ref(), opts).await?;
        self.write_response(res)
    }

    async fn delete(&self, ctx: &RequestContext, name: &str, opts: &DeleteOptions) -> ApiResult<Value> {
        let old = self.store.delete(ctx, name, self.admission.as_ref(), opts).await?;
        self.encode(&old)
    }

    async fn get(&self, ctx: &RequestContext, name: &str) -> ApiResult<Value> {
        let obj = self.store.get(ctx, name).await?;
        self.encode(&obj)
    }

    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> ApiResult<Value> {
        let t0 = Instant::now();
        let list = self.store.list(ctx, opts).await?;
        let items = list.items.iter().map(|o| self.encode(o)).collect::<ApiResult<Vec<_>>>()?;
        let metadata = ListMeta {
            resource_version: Some(list.resource_version),
            continue_: list.continue_token,
            ..Default::default()
        };
        debug!(resource = %self.descriptor.qualified_resource(), items = items.len(), took_ms = %t0.elapsed().as_millis(), "rest: list");
        Ok(json!({
            "apiVersion": self.descriptor.group_version().api_version(),
            "kind": self.descriptor.list_kind(),
            "metadata": serde_json::to_value(metadata)?,
            "items": items,
        }))
    }

    async fn watch(&self, ctx: &RequestContext, opts: &WatchOptions) -> ApiResult<EventStream> {
        let events = self.store.watch(ctx, opts).await?;
        let registry = self.store.registry().clone();
        let version = self.version.clone();
        info!(resource = %self.descriptor.qualified_resource(), ns = ?ctx.namespace(), rv = ?opts.resource_version, "rest: watch opened");
        Ok(events.map(move |ev| event_frame(&registry, &version, ev)).boxed())
    }
}
