//! Foundry generic store: one CRUD+list+watch implementation for every
//! registered kind, parameterized by the kind's strategy, the registry's storage
//! codec and a versioned key-value backend.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use chrono::{SubsecRound, Utc};
use foundry_core::{
    ApiError, ApiResult, FieldError, Kind, MetaExt, Operation, RequestContext, ResourceDescriptor, Strategy, Time,
    UserInfo,
};
use foundry_schema::Registry;
use futures::StreamExt;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

pub mod backend;
pub mod continuation;
pub mod memory;
pub mod options;
pub mod predicate;
pub mod strategy;
pub mod validation;

pub use backend::{Backend, BackendError, BackendEvent, KeyValue, RangePage};
pub use memory::MemoryBackend;
pub use options::{
    CreateOptions, DeleteOptions, ListOptions, ObjectList, Preconditions, UpdateOptions, WatchEvent, WatchOptions,
    WatchStream, WriteResult,
};
pub use predicate::{
    object_meta_attrs, AttrsFn, FieldSelector, LabelSelector, ObjectAttrs, SelectionPredicate, SelectorError,
    FIELD_NAME, FIELD_NAMESPACE,
};
pub use strategy::{DefaultStrategy, NameGenerator, SimpleNameGenerator};

use continuation::Continuation;
use options::parse_revision;

/// One mutation handed to admission, borrowed from the store for the call.
pub struct AdmissionRequest<'a, T> {
    pub operation: Operation,
    pub descriptor: &'a ResourceDescriptor,
    pub namespace: &'a str,
    pub name: &'a str,
    /// Candidate object; absent for deletes.
    pub object: Option<&'a mut T>,
    /// Persisted object; present for updates and deletes.
    pub old: Option<&'a T>,
    pub user: Option<&'a UserInfo>,
    pub dry_run: bool,
}

/// Evaluation point for admission, called before any strategy hook or write.
#[async_trait::async_trait]
pub trait AdmissionHook<T: Kind>: Send + Sync {
    async fn admit(&self, ctx: &RequestContext, req: AdmissionRequest<'_, T>) -> ApiResult<()>;
}

/// Admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdmission;

#[async_trait::async_trait]
impl<T: Kind> AdmissionHook<T> for NoAdmission {
    async fn admit(&self, _ctx: &RequestContext, _req: AdmissionRequest<'_, T>) -> ApiResult<()> { Ok(()) }
}

/// Produces the desired object of an update from the persisted one (absent when
/// the update may create).
pub trait UpdatedObject<T>: Send + Sync {
    fn updated_object(&self, old: Option<&T>) -> ApiResult<T>;
}

impl<T, F> UpdatedObject<T> for F
where
    F: Fn(Option<&T>) -> ApiResult<T> + Send + Sync,
{
    fn updated_object(&self, old: Option<&T>) -> ApiResult<T> { self(old) }
}

/// Replace the persisted object wholesale.
#[derive(Debug, Clone)]
pub struct Replace<T>(pub T);

impl<T: Clone + Send + Sync> UpdatedObject<T> for Replace<T> {
    fn updated_object(&self, _old: Option<&T>) -> ApiResult<T> { Ok(self.0.clone()) }
}

/// Generic store for kind `T`.
pub struct Store<T: Kind> {
    descriptor: Arc<ResourceDescriptor>,
    registry: Arc<Registry>,
    strategy: Arc<dyn Strategy<T>>,
    backend: Arc<dyn Backend>,
    root: String,
    attrs: AttrsFn<T>,
    fields: Arc<Vec<String>>,
}

impl<T: Kind> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            registry: self.registry.clone(),
            strategy: self.strategy.clone(),
            backend: self.backend.clone(),
            root: self.root.clone(),
            attrs: self.attrs.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl<T: Kind> Store<T> {
    /// Bind the registered kind `gvk` (its descriptor, strategy and storage version)
    /// to `backend` under `prefix`.
    pub fn new(
        registry: Arc<Registry>,
        gvk: &foundry_core::GroupVersionKind,
        backend: Arc<dyn Backend>,
        prefix: &str,
    ) -> ApiResult<Self> {
        let descriptor = registry.resolve(gvk)?;
        let strategy = registry.strategy::<T>(gvk)?;
        let root = [prefix.trim_end_matches('/'), descriptor.group.as_str(), descriptor.plural.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        let root = if root.starts_with('/') { root } else { format!("/{root}") };
        let namespaced = descriptor.namespaced;
        let mut fields = vec![FIELD_NAME.to_string()];
        if namespaced { fields.push(FIELD_NAMESPACE.to_string()); }
        info!(gvk = %descriptor.gvk(), root = %root, "store: bound");
        Ok(Self {
            descriptor,
            registry,
            strategy,
            backend,
            root,
            attrs: Arc::new(move |obj: &T| object_meta_attrs(obj.meta(), namespaced)),
            fields: Arc::new(fields),
        })
    }

    /// Replace the attribute extractor; `extra_fields` widens the accepted field-selector labels.
    pub fn with_attrs(mut self, attrs: AttrsFn<T>, extra_fields: &[&str]) -> Self {
        let mut fields = (*self.fields).clone();
        fields.extend(extra_fields.iter().map(|f| f.to_string()));
        self.attrs = attrs;
        self.fields = Arc::new(fields);
        self
    }

    pub fn descriptor(&self) -> &Arc<ResourceDescriptor> { &self.descriptor }
    pub fn registry(&self) -> &Arc<Registry> { &self.registry }
    pub fn strategy(&self) -> &Arc<dyn Strategy<T>> { &self.strategy }

    /// Build a predicate from textual selectors using this kind's attribute extractor.
    pub fn predicate(&self, label: &str, field: &str) -> ApiResult<SelectionPredicate<T>> {
        let label = LabelSelector::parse(label)?;
        let field = FieldSelector::parse(field)?;
        let supported: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        field.check_supported(&supported)?;
        Ok(SelectionPredicate::new(label, field, self.attrs.clone()))
    }

    fn resource(&self) -> String { self.descriptor.qualified_resource() }

    fn key(&self, namespace: &str, name: &str) -> String {
        if self.descriptor.namespaced {
            format!("{}/{}/{}", self.root, namespace, name)
        } else {
            format!("{}/{}", self.root, name)
        }
    }

    fn list_prefix(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if self.descriptor.namespaced => format!("{}/{}/", self.root, ns),
            _ => format!("{}/", self.root),
        }
    }

    /// Namespace that addresses an existing object of this kind.
    fn target_namespace<'a>(&self, ctx: &'a RequestContext) -> ApiResult<&'a str> {
        if !self.descriptor.namespaced { return Ok(""); }
        ctx.namespace().ok_or_else(|| ApiError::bad_request("namespace is required for a namespaced resource"))
    }

    /// Reconcile the object's namespace with the request's.
    fn resolve_namespace(&self, ctx: &RequestContext, obj: &mut T) -> ApiResult<()> {
        let meta = obj.meta_mut();
        if !self.descriptor.namespaced {
            meta.namespace = None;
            return Ok(());
        }
        let own = meta.namespace.clone().filter(|ns| !ns.is_empty());
        match (ctx.namespace(), own.as_deref()) {
            (Some(req), None) => meta.namespace = Some(req.to_string()),
            (Some(req), Some(own)) if req != own => {
                return Err(ApiError::bad_request(
                    "the namespace of the provided object does not match the namespace sent on the request",
                ))
            }
            _ => {}
        }
        Ok(())
    }

    fn map_backend(&self, err: BackendError, name: &str) -> ApiError {
        if let BackendError::Unavailable(msg) = &err {
            warn!(gvk = %self.descriptor.gvk(), error = %msg, "store: backend unavailable");
        }
        err.into_api_error(&self.resource(), name)
    }

    fn decode_kv(&self, kv: &KeyValue) -> ApiResult<T> {
        let value: serde_json::Value = serde_json::from_slice(&kv.value)
            .map_err(|e| ApiError::internal(format!("undecodable object at {}: {e}", kv.key)))?;
        let mut obj = self
            .registry
            .decode_stored::<T>(value)
            .map_err(|e| ApiError::internal(format!("undecodable object at {}: {e}", kv.key)))?;
        obj.meta_mut().resource_version = Some(kv.mod_revision.to_string());
        Ok(obj)
    }

    /// Storage form: the registered external version, without a resource version.
    fn encode_obj(&self, obj: &T) -> ApiResult<Vec<u8>> {
        let mut value = self
            .registry
            .encode(obj, &self.descriptor.version)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        if let Some(meta) = value.get_mut("metadata").and_then(serde_json::Value::as_object_mut) {
            meta.remove("resourceVersion");
        }
        serde_json::to_vec(&value).map_err(|e| ApiError::internal(e.to_string()))
    }

    fn invalid(&self, name: &str, errors: Vec<FieldError>) -> ApiError {
        ApiError::invalid(self.descriptor.kind.clone(), name, errors)
    }

    fn record(&self, verb: &'static str, started: Instant, outcome: Result<(), &ApiError>) {
        let code = match outcome {
            Ok(()) => "OK",
            Err(e) => e.reason(),
        };
        counter!("foundry_store_requests_total", 1, "verb" => verb, "resource" => self.descriptor.plural.clone(), "code" => code);
        histogram!("foundry_store_request_ms", started.elapsed().as_secs_f64() * 1000.0, "verb" => verb);
    }

    pub async fn get(&self, ctx: &RequestContext, name: &str) -> ApiResult<T> {
        let started = Instant::now();
        let res = self.get_inner(ctx, name).await;
        self.record("get", started, res.as_ref().map(|_| ()));
        res
    }

    async fn get_inner(&self, ctx: &RequestContext, name: &str) -> ApiResult<T> {
        ctx.check_cancelled()?;
        let ns = self.target_namespace(ctx)?;
        let key = self.key(ns, name);
        match self.backend.get(&key).await.map_err(|e| self.map_backend(e, name))? {
            Some(kv) => self.decode_kv(&kv),
            None => Err(ApiError::not_found(self.resource(), name)),
        }
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        obj: T,
        admit: &dyn AdmissionHook<T>,
        opts: &CreateOptions,
    ) -> ApiResult<WriteResult<T>> {
        let started = Instant::now();
        let res = self.create_inner(ctx, obj, admit, opts.dry_run).await;
        self.record("create", started, res.as_ref().map(|_| ()));
        res
    }

    async fn create_inner(
        &self,
        ctx: &RequestContext,
        mut obj: T,
        admit: &dyn AdmissionHook<T>,
        dry_run: bool,
    ) -> ApiResult<WriteResult<T>> {
        ctx.check_cancelled()?;
        self.resolve_namespace(ctx, &mut obj)?;
        if !obj.meta().resource_version_or_empty().is_empty() {
            return Err(ApiError::bad_request("resourceVersion should not be set on objects to be created"));
        }

        let ns = obj.meta().namespace_or_empty().to_string();
        let name = obj.meta().name_or_empty().to_string();
        admit
            .admit(
                ctx,
                AdmissionRequest {
                    operation: Operation::Create,
                    descriptor: &self.descriptor,
                    namespace: &ns,
                    name: &name,
                    object: Some(&mut obj),
                    old: None,
                    user: ctx.user(),
                    dry_run,
                },
            )
            .await?;

        self.strategy.prepare_for_create(&mut obj);
        {
            let meta = obj.meta_mut();
            if meta.name_or_empty().is_empty() {
                if let Some(base) = meta.generate_name.clone().filter(|g| !g.is_empty()) {
                    meta.name = Some(self.strategy.generate_name(&base));
                }
            }
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
            meta.creation_timestamp = Some(Time(Utc::now().trunc_subsecs(0)));
            meta.resource_version = None;
        }
        let name = obj.meta().name_or_empty().to_string();
        let errs = self.strategy.validate(&obj);
        if !errs.is_empty() {
            debug!(gvk = %self.descriptor.gvk(), name = %name, errors = errs.len(), "store: create rejected by validation");
            return Err(self.invalid(&name, errs));
        }
        self.strategy.canonicalize(&mut obj);
        let warnings = self.strategy.warnings_on_create(&obj);

        if dry_run {
            return Ok(WriteResult { object: obj, created: true, warnings });
        }
        ctx.check_cancelled()?;
        let key = self.key(obj.meta().namespace_or_empty(), &name);
        let bytes = self.encode_obj(&obj)?;
        let kv = self.backend.create(&key, bytes).await.map_err(|e| self.map_backend(e, &name))?;
        obj.meta_mut().resource_version = Some(kv.mod_revision.to_string());
        debug!(gvk = %self.descriptor.gvk(), key = %key, rv = kv.mod_revision, "store: created");
        Ok(WriteResult { object: obj, created: true, warnings })
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        updater: &dyn UpdatedObject<T>,
        admit: &dyn AdmissionHook<T>,
        opts: &UpdateOptions,
    ) -> ApiResult<WriteResult<T>> {
        let started = Instant::now();
        let res = self.update_inner(ctx, name, updater, admit, opts.dry_run).await;
        self.record("update", started, res.as_ref().map(|_| ()));
        res
    }

    async fn update_inner(
        &self,
        ctx: &RequestContext,
        name: &str,
        updater: &dyn UpdatedObject<T>,
        admit: &dyn AdmissionHook<T>,
        dry_run: bool,
    ) -> ApiResult<WriteResult<T>> {
        ctx.check_cancelled()?;
        let ns = self.target_namespace(ctx)?.to_string();
        let key = self.key(&ns, name);
        let current = self.backend.get(&key).await.map_err(|e| self.map_backend(e, name))?;

        let Some(kv) = current else {
            if !self.strategy.allow_create_on_update() {
                return Err(ApiError::not_found(self.resource(), name));
            }
            let mut obj = updater.updated_object(None)?;
            self.check_identity(&mut obj, &ns, name)?;
            obj.meta_mut().resource_version = None;
            debug!(gvk = %self.descriptor.gvk(), name = %name, "store: update falls through to create");
            return self.create_inner(ctx, obj, admit, dry_run).await;
        };

        let old = self.decode_kv(&kv)?;
        let mut obj = updater.updated_object(Some(&old))?;
        self.check_identity(&mut obj, &ns, name)?;

        let current_rv = kv.mod_revision.to_string();
        match obj.meta().resource_version_or_empty() {
            "" if !self.strategy.allow_unconditional_update() => {
                return Err(self.invalid(
                    name,
                    vec![FieldError::invalid("metadata.resourceVersion", "", "must be specified for an update")],
                ));
            }
            "" => {}
            rv if rv != current_rv => {
                return Err(ApiError::conflict(
                    self.resource(),
                    name,
                    "the object has been modified; please apply your changes to the latest version and try again",
                ));
            }
            _ => {}
        }
        obj.meta_mut().resource_version = Some(current_rv);

        admit
            .admit(
                ctx,
                AdmissionRequest {
                    operation: Operation::Update,
                    descriptor: &self.descriptor,
                    namespace: &ns,
                    name,
                    object: Some(&mut obj),
                    old: Some(&old),
                    user: ctx.user(),
                    dry_run,
                },
            )
            .await?;

        {
            let meta = obj.meta_mut();
            if meta.uid_or_empty().is_empty() {
                meta.uid = old.meta().uid.clone();
            }
            meta.creation_timestamp = old.meta().creation_timestamp.clone();
        }
        self.strategy.prepare_for_update(&mut obj, &old);
        let errs = self.strategy.validate_update(&obj, &old);
        if !errs.is_empty() {
            debug!(gvk = %self.descriptor.gvk(), name = %name, errors = errs.len(), "store: update rejected by validation");
            return Err(self.invalid(name, errs));
        }
        self.strategy.canonicalize(&mut obj);
        let warnings = self.strategy.warnings_on_update(&obj, &old);

        if obj == old {
            debug!(gvk = %self.descriptor.gvk(), name = %name, "store: no-op update");
            return Ok(WriteResult { object: old, created: false, warnings });
        }
        if dry_run {
            return Ok(WriteResult { object: obj, created: false, warnings });
        }
        ctx.check_cancelled()?;
        let bytes = self.encode_obj(&obj)?;
        let kv = self
            .backend
            .compare_and_swap(&key, kv.mod_revision, bytes)
            .await
            .map_err(|e| self.map_backend(e, name))?;
        obj.meta_mut().resource_version = Some(kv.mod_revision.to_string());
        debug!(gvk = %self.descriptor.gvk(), key = %key, rv = kv.mod_revision, "store: updated");
        Ok(WriteResult { object: obj, created: false, warnings })
    }

    /// The updated object must address the same name and namespace as the request.
    fn check_identity(&self, obj: &mut T, ns: &str, name: &str) -> ApiResult<()> {
        let own = obj.meta().name_or_empty();
        if own.is_empty() {
            obj.meta_mut().name = Some(name.to_string());
        } else if own != name {
            return Err(ApiError::bad_request(format!(
                "the name of the object ({own}) does not match the name on the URL ({name})"
            )));
        }
        if !self.descriptor.namespaced {
            obj.meta_mut().namespace = None;
            return Ok(());
        }
        let own_ns = obj.meta().namespace_or_empty();
        if own_ns.is_empty() {
            obj.meta_mut().namespace = Some(ns.to_string());
        } else if own_ns != ns {
            return Err(ApiError::bad_request(
                "the namespace of the provided object does not match the namespace sent on the request",
            ));
        }
        Ok(())
    }

    pub async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        admit: &dyn AdmissionHook<T>,
        opts: &DeleteOptions,
    ) -> ApiResult<T> {
        let started = Instant::now();
        let res = self.delete_inner(ctx, name, admit, opts).await;
        self.record("delete", started, res.as_ref().map(|_| ()));
        res
    }

    async fn delete_inner(
        &self,
        ctx: &RequestContext,
        name: &str,
        admit: &dyn AdmissionHook<T>,
        opts: &DeleteOptions,
    ) -> ApiResult<T> {
        ctx.check_cancelled()?;
        let ns = self.target_namespace(ctx)?.to_string();
        let key = self.key(&ns, name);
        let kv = self
            .backend
            .get(&key)
            .await
            .map_err(|e| self.map_backend(e, name))?
            .ok_or_else(|| ApiError::not_found(self.resource(), name))?;
        let old = self.decode_kv(&kv)?;

        let pre = &opts.preconditions;
        if let Some(uid) = pre.uid.as_deref() {
            if uid != old.meta().uid_or_empty() {
                return Err(ApiError::conflict(
                    self.resource(),
                    name,
                    format!("Precondition failed: UID in precondition: {}, UID in object meta: {}", uid, old.meta().uid_or_empty()),
                ));
            }
        }
        if let Some(rv) = pre.resource_version.as_deref() {
            if rv != old.meta().resource_version_or_empty() {
                return Err(ApiError::conflict(
                    self.resource(),
                    name,
                    format!(
                        "Precondition failed: ResourceVersion in precondition: {}, ResourceVersion in object meta: {}",
                        rv,
                        old.meta().resource_version_or_empty()
                    ),
                ));
            }
        }

        admit
            .admit(
                ctx,
                AdmissionRequest {
                    operation: Operation::Delete,
                    descriptor: &self.descriptor,
                    namespace: &ns,
                    name,
                    object: None,
                    old: Some(&old),
                    user: ctx.user(),
                    dry_run: opts.dry_run,
                },
            )
            .await?;

        if opts.dry_run {
            return Ok(old);
        }
        ctx.check_cancelled()?;
        self.backend.delete(&key, kv.mod_revision).await.map_err(|e| self.map_backend(e, name))?;
        debug!(gvk = %self.descriptor.gvk(), key = %key, "store: deleted");
        Ok(old)
    }

    pub async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> ApiResult<ObjectList<T>> {
        let started = Instant::now();
        let res = self.list_inner(ctx, opts).await;
        self.record("list", started, res.as_ref().map(|_| ()));
        res
    }

    async fn list_inner(&self, ctx: &RequestContext, opts: &ListOptions) -> ApiResult<ObjectList<T>> {
        ctx.check_cancelled()?;
        let pred = self.predicate(&opts.label_selector, &opts.field_selector)?;
        let prefix = self.list_prefix(ctx.namespace());

        let (mut start, mut revision, from_token) = match opts.continue_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => {
                let c = Continuation::decode(token)?;
                (Some(format!("{prefix}{}", c.start)), Some(c.rv), true)
            }
            None => (None, parse_revision(opts.resource_version.as_deref())?, false),
        };

        let limit = opts.limit;
        let mut items = Vec::new();
        let mut more = false;
        let mut last_key: Option<String> = None;
        loop {
            ctx.check_cancelled()?;
            let want = if limit == 0 { 0 } else { limit - items.len() };
            let page = match self.backend.range(&prefix, start.as_deref(), want, revision).await {
                Ok(page) => page,
                Err(BackendError::Compacted { .. }) if from_token => {
                    return Err(ApiError::gone(
                        "the provided continue parameter is too old to display a consistent list result; start a new list without the continue parameter",
                    ))
                }
                Err(e) => return Err(self.map_backend(e, "")),
            };
            revision = Some(page.revision);
            for kv in &page.items {
                let obj = self.decode_kv(kv)?;
                if pred.matches(&obj) {
                    items.push(obj);
                }
                last_key = Some(kv.key.clone());
            }
            if !page.more {
                break;
            }
            if limit > 0 && items.len() >= limit {
                more = true;
                break;
            }
            start = last_key.clone();
        }

        let revision = revision.unwrap_or_default();
        let continue_token = match (more, last_key) {
            (true, Some(key)) => {
                let start = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
                Some(Continuation { rv: revision, start }.encode()?)
            }
            _ => None,
        };
        debug!(gvk = %self.descriptor.gvk(), ns = ?ctx.namespace(), items = items.len(), rv = revision, "store: list");
        Ok(ObjectList { items, resource_version: revision.to_string(), continue_token })
    }

    /// Events after `opts.resource_version`, or the current state as `Added` followed by
    /// live changes when none is given. Ends on cancellation, drop, or after the first error.
    pub async fn watch(&self, ctx: &RequestContext, opts: &WatchOptions) -> ApiResult<WatchStream<T>> {
        let started = Instant::now();
        let res = self.watch_inner(ctx, opts).await;
        self.record("watch", started, res.as_ref().map(|_| ()));
        res
    }

    async fn watch_inner(&self, ctx: &RequestContext, opts: &WatchOptions) -> ApiResult<WatchStream<T>> {
        ctx.check_cancelled()?;
        let pred = self.predicate(&opts.label_selector, &opts.field_selector)?;
        let prefix = self.list_prefix(ctx.namespace());

        let (initial, from) = match parse_revision(opts.resource_version.as_deref())? {
            Some(rv) => (Vec::new(), rv),
            None => {
                let page = self.backend.range(&prefix, None, 0, None).await.map_err(|e| self.map_backend(e, ""))?;
                let mut initial = Vec::new();
                for kv in &page.items {
                    let obj = self.decode_kv(kv)?;
                    if pred.matches(&obj) {
                        initial.push(Ok(WatchEvent::Added(obj)));
                    }
                }
                (initial, page.revision)
            }
        };
        let changes = self.backend.subscribe(&prefix, from).await.map_err(|e| self.map_backend(e, ""))?;
        info!(gvk = %self.descriptor.gvk(), ns = ?ctx.namespace(), from, replay = initial.len(), "store: watch started");

        let this = self.clone();
        let live = changes.filter_map(move |res| {
            let out = match res {
                Ok(ev) => this.translate(ev, &pred).transpose(),
                Err(e) => Some(Err(this.map_backend(e, ""))),
            };
            futures::future::ready(out)
        });
        let token = ctx.cancellation().clone();
        let stream = futures::stream::iter(initial)
            .chain(live)
            .scan(false, |failed, item| {
                if *failed {
                    return futures::future::ready(None);
                }
                *failed = item.is_err();
                futures::future::ready(Some(item))
            })
            .take_until(async move { token.cancelled().await })
            .boxed();
        Ok(stream)
    }

    /// Map one backend change onto the predicate: crossing into the selection is
    /// `Added`, crossing out of it `Deleted`.
    fn translate(&self, ev: BackendEvent, pred: &SelectionPredicate<T>) -> ApiResult<Option<WatchEvent<T>>> {
        let current = ev.current.as_ref().map(|kv| self.decode_kv(kv)).transpose()?;
        let previous = ev.previous.as_ref().map(|kv| self.decode_kv(kv)).transpose()?;
        let event = match (current, previous) {
            (Some(cur), None) => pred.matches(&cur).then(|| WatchEvent::Added(cur)),
            (Some(cur), Some(prev)) => match (pred.matches(&prev), pred.matches(&cur)) {
                (true, true) => Some(WatchEvent::Modified(cur)),
                (false, true) => Some(WatchEvent::Added(cur)),
                (true, false) => Some(WatchEvent::Deleted(cur)),
                (false, false) => None,
            },
            (None, Some(mut prev)) => pred.matches(&prev).then(|| {
                prev.meta_mut().resource_version = Some(ev.revision.to_string());
                WatchEvent::Deleted(prev)
            }),
            (None, None) => None,
        };
        Ok(event)
    }
}
