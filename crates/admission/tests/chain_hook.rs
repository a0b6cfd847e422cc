#![forbid(unsafe_code)]

use std::sync::Arc;

use foundry_admission::{
    builtin, AdmissionConfig, AdmissionResult, Attributes, Chain, ChainHook, Handler, Interface, MutationInterface,
    Plugins,
};
use foundry_core::{GroupVersionKind, MetaExt, ObjectMeta, Operation, RequestContext, ResourceDescriptor};
use foundry_schema::{Registry, VersionCodec};
use foundry_store::{Backend, CreateOptions, DefaultStrategy, DeleteOptions, MemoryBackend, NoAdmission, Store};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Ticket {
    #[serde(default)]
    metadata: ObjectMeta,
}
foundry_core::impl_kind!(Ticket, "desk.io", "Ticket");

/// Labels every created ticket with the configured owner.
struct Owner {
    handler: Handler,
    owner: String,
}

impl Interface for Owner {
    fn handles(&self, op: Operation) -> bool { self.handler.handles(op) }
    fn as_mutating(&self) -> Option<&dyn MutationInterface> { Some(self) }
}

#[async_trait::async_trait]
impl MutationInterface for Owner {
    async fn admit(&self, _ctx: &RequestContext, attrs: &mut Attributes<'_>) -> AdmissionResult<()> {
        if let Some(obj) = attrs.object_mut() {
            obj.meta_mut().labels.get_or_insert_with(Default::default).insert("owner".into(), self.owner.clone());
        }
        Ok(())
    }
}

fn plugins() -> Plugins {
    let mut plugins = Plugins::new();
    builtin::register(&mut plugins).unwrap();
    plugins
        .register("Owner", |config| {
            let owner = config.and_then(|c| c.get("owner")).and_then(|v| v.as_str()).unwrap_or("nobody").to_string();
            Ok(Arc::new(Owner { handler: Handler::new(&[Operation::Create]), owner }) as Arc<dyn Interface>)
        })
        .unwrap();
    plugins
}

fn store(backend: Arc<MemoryBackend>) -> Store<Ticket> {
    let mut b = Registry::builder();
    b.register(
        ResourceDescriptor::new("desk.io", "v1", "Ticket", "tickets", true),
        DefaultStrategy::namespaced,
        VersionCodec::<Ticket, Ticket>::identity(),
    )
    .unwrap();
    Store::new(Arc::new(b.build()), &GroupVersionKind::new("desk.io", "v1", "Ticket"), backend, "/registry").unwrap()
}

fn ticket(name: &str) -> Ticket {
    Ticket { metadata: ObjectMeta { name: Some(name.into()), ..Default::default() } }
}

#[tokio::test]
async fn configured_chain_mutates_through_the_store() {
    let config = AdmissionConfig::from_yaml_str("plugins:\n  - name: AlwaysAdmit\n  - name: Owner\n    configuration: {owner: ops}\n").unwrap();
    let hook = ChainHook::new(Arc::new(Chain::from_config(&plugins(), &config).unwrap()));
    assert_eq!(hook.chain().names(), vec!["AlwaysAdmit", "Owner"]);

    let store = store(Arc::new(MemoryBackend::new()));
    let ctx = RequestContext::new().with_namespace("default");
    let created = store.create(&ctx, ticket("t1"), &hook, &CreateOptions::default()).await.unwrap().object;
    assert_eq!(created.metadata.labels_or_empty().get("owner").map(String::as_str), Some("ops"));

    // Owner only handles creates; the delete passes untouched.
    let deleted = store.delete(&ctx, "t1", &hook, &DeleteOptions::default()).await.unwrap();
    assert_eq!(deleted.metadata.name_or_empty(), "t1");
}

#[tokio::test]
async fn always_deny_blocks_every_write() {
    let hook = ChainHook::new(Arc::new(Chain::from_config(&plugins(), &AdmissionConfig::from_names(&["AlwaysDeny"])).unwrap()));
    let backend = Arc::new(MemoryBackend::new());
    let store = store(backend.clone());
    let ctx = RequestContext::new().with_namespace("default");

    let err = store.create(&ctx, ticket("t1"), &hook, &CreateOptions::default()).await.unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(err.to_string(), "tickets.desk.io \"default/t1\" is forbidden: admission control is denying all modifications");
    assert_eq!(backend.current_revision().await.unwrap(), 0);

    store.create(&ctx, ticket("t2"), &NoAdmission, &CreateOptions::default()).await.unwrap();
    let err = store.delete(&ctx, "t2", &hook, &DeleteOptions::default()).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(store.get(&ctx, "t2").await.is_ok());
}

#[test]
fn unknown_plugin_is_a_startup_error() {
    assert!(Chain::from_config(&plugins(), &AdmissionConfig::from_names(&["AlwaysAdmit", "Missing"])).is_err());
}
