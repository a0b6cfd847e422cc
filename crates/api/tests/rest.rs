#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use foundry_api::{ApiGroupInfo, ApiServer, InstallError, Reply, Request, Rest, RestStorage, Verb};
use foundry_core::{GroupVersionKind, ObjectMeta, RequestContext, ResourceDescriptor};
use foundry_schema::{Registry, VersionCodec};
use foundry_store::{CreateOptions, DefaultStrategy, ListOptions, MemoryBackend, Store, UpdateOptions, WatchOptions};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq)]
struct Note {
    metadata: ObjectMeta,
    text: String,
    priority: i32,
}
foundry_core::impl_kind!(Note, "notes.io", "Note");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NoteV1 {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    text: String,
    #[serde(default)]
    priority: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NoteV2 {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    body: String,
    #[serde(default)]
    priority: i32,
}

fn v1_to_internal(e: NoteV1) -> Note { Note { metadata: e.metadata, text: e.text, priority: e.priority } }
fn internal_to_v1(i: &Note) -> NoteV1 { NoteV1 { metadata: i.metadata.clone(), text: i.text.clone(), priority: i.priority } }
fn v2_to_internal(e: NoteV2) -> Note { Note { metadata: e.metadata, text: e.body, priority: e.priority } }
fn internal_to_v2(i: &Note) -> NoteV2 { NoteV2 { metadata: i.metadata.clone(), body: i.text.clone(), priority: i.priority } }

fn default_v1(n: &mut NoteV1) {
    if n.priority == 0 { n.priority = 1; }
}

fn registry() -> Arc<Registry> {
    let mut b = Registry::builder();
    b.register(
        ResourceDescriptor::new("notes.io", "v1", "Note", "notes", true),
        DefaultStrategy::namespaced,
        VersionCodec::new(v1_to_internal, internal_to_v1).with_defaults(default_v1),
    )
    .unwrap()
    .register(
        ResourceDescriptor::new("notes.io", "v2", "Note", "notes", true),
        DefaultStrategy::namespaced,
        VersionCodec::new(v2_to_internal, internal_to_v2),
    )
    .unwrap();
    Arc::new(b.build())
}

fn rest() -> Rest<Note> {
    let store = Store::new(registry(), &GroupVersionKind::new("notes.io", "v1", "Note"), Arc::new(MemoryBackend::new()), "/registry")
        .unwrap();
    Rest::new(store)
}

fn server() -> ApiServer {
    let v1 = rest();
    let v2 = Rest::new(v1.store().clone()).with_version("v2").unwrap();
    let mut server = ApiServer::new(v1.store().registry().clone());
    let mut info = ApiGroupInfo::new("notes.io");
    info.add(Arc::new(v1)).unwrap().add(Arc::new(v2)).unwrap();
    server.install_group(info).unwrap();
    server
}

fn ctx() -> RequestContext { RequestContext::new().with_namespace("default") }

fn request(verb: Verb, version: &str, name: Option<&str>, body: Option<Value>) -> Request {
    Request {
        id: "r1".into(),
        verb,
        group: "notes.io".into(),
        version: version.into(),
        resource: "notes".into(),
        namespace: Some("default".into()),
        name: name.map(Into::into),
        body,
        options: Value::Null,
        user: None,
    }
}

fn object(reply: Reply) -> (u16, Value) {
    match reply {
        Reply::Object { code, body, .. } => (code, body),
        Reply::Watch(_) => panic!("unexpected watch reply"),
    }
}

#[tokio::test]
async fn create_fills_type_meta_and_applies_defaults_once() {
    let rest = rest();
    let res = rest.create(&ctx(), json!({"metadata": {"name": "a"}, "text": "hi"}), &CreateOptions::default()).await.unwrap();
    assert!(res.created);
    assert_eq!(res.code(), 201);
    assert_eq!(res.object["apiVersion"], "notes.io/v1");
    assert_eq!(res.object["kind"], "Note");
    assert_eq!(res.object["priority"], 1);
    assert_eq!(res.object["metadata"]["namespace"], "default");
    assert!(res.object["metadata"]["resourceVersion"].as_str().is_some());
}

#[tokio::test]
async fn body_of_another_kind_is_rejected() {
    let rest = rest();
    let err = rest
        .create(&ctx(), json!({"apiVersion": "notes.io/v1", "kind": "Memo", "metadata": {"name": "a"}}), &CreateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
    let err = rest.create(&ctx(), json!(["not", "an", "object"]), &CreateOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), 400);
}

#[tokio::test]
async fn versions_share_storage_and_render_their_own_shape() {
    let v1 = rest();
    let v2 = Rest::new(v1.store().clone()).with_version("v2").unwrap();
    v1.create(&ctx(), json!({"metadata": {"name": "a"}, "text": "hello", "priority": 3}), &CreateOptions::default()).await.unwrap();

    let got = v2.get(&ctx(), "a").await.unwrap();
    assert_eq!(got["apiVersion"], "notes.io/v2");
    assert_eq!(got["body"], "hello");
    assert!(got.get("text").is_none());

    // A v2 write is visible through v1.
    let mut edit = got.clone();
    edit["body"] = json!("edited");
    let res = v2.update(&ctx(), "a", edit, &UpdateOptions::default()).await.unwrap();
    assert!(!res.created);
    assert_eq!(v1.get(&ctx(), "a").await.unwrap()["text"], "edited");
    assert!(Rest::new(v1.store().clone()).with_version("v9").is_err());
}

#[tokio::test]
async fn update_with_stale_version_conflicts() {
    let rest = rest();
    let first = rest.create(&ctx(), json!({"metadata": {"name": "a"}, "text": "x"}), &CreateOptions::default()).await.unwrap().object;
    let mut second = first.clone();
    second["text"] = json!("y");
    rest.update(&ctx(), "a", second, &UpdateOptions::default()).await.unwrap();
    let mut stale = first;
    stale["text"] = json!("z");
    assert_eq!(rest.update(&ctx(), "a", stale, &UpdateOptions::default()).await.unwrap_err().code(), 409);
}

#[tokio::test]
async fn list_is_a_kind_list_with_paging_metadata() {
    let rest = rest();
    for name in ["c", "a", "b"] {
        rest.create(&ctx(), json!({"metadata": {"name": name}}), &CreateOptions::default()).await.unwrap();
    }
    let page = rest.list(&ctx(), &ListOptions { limit: 2, ..Default::default() }).await.unwrap();
    assert_eq!(page["kind"], "NoteList");
    assert_eq!(page["apiVersion"], "notes.io/v1");
    let names: Vec<_> = page["items"].as_array().unwrap().iter().map(|o| o["metadata"]["name"].clone()).collect();
    assert_eq!(names, vec![json!("a"), json!("b")]);
    let token = page["metadata"]["continue"].as_str().unwrap().to_string();
    assert!(page["metadata"]["resourceVersion"].as_str().is_some());

    let rest_page = rest
        .list(&ctx(), &ListOptions { limit: 2, continue_token: Some(token), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(rest_page["items"][0]["metadata"]["name"], "c");
    assert!(rest_page["metadata"].get("continue").is_none());
}

#[tokio::test]
async fn watch_emits_typed_frames() {
    let rest = rest();
    let token = CancellationToken::new();
    let wctx = ctx().with_cancellation(token.clone());
    let mut frames = rest.watch(&wctx, &WatchOptions::default()).await.unwrap();
    rest.create(&ctx(), json!({"metadata": {"name": "a"}, "text": "x"}), &CreateOptions::default()).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.next()).await.unwrap().unwrap();
    assert_eq!(frame["type"], "ADDED");
    assert_eq!(frame["object"]["apiVersion"], "notes.io/v1");
    assert_eq!(frame["object"]["metadata"]["name"], "a");

    token.cancel();
    assert!(tokio::time::timeout(Duration::from_secs(2), frames.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn install_rejects_duplicates_and_unknown_kinds() {
    let mut server = server();
    let mut again = ApiGroupInfo::new("notes.io");
    again.add(Arc::new(rest())).unwrap();
    assert!(matches!(server.install_group(again), Err(InstallError::Duplicate(_))));

    let mut dup = ApiGroupInfo::new("notes.io");
    dup.add(Arc::new(rest())).unwrap();
    assert!(matches!(dup.add(Arc::new(rest())), Err(InstallError::Duplicate(_))));

    let mut wrong = ApiGroupInfo::new("other.io");
    assert!(matches!(wrong.add(Arc::new(rest())), Err(InstallError::WrongGroup { .. })));

    let mut empty = ApiServer::new(Arc::new(Registry::builder().build()));
    let mut info = ApiGroupInfo::new("notes.io");
    info.add(Arc::new(rest())).unwrap();
    assert!(matches!(empty.install_group(info), Err(InstallError::Unregistered(_))));
}

#[tokio::test]
async fn discovery_lists_installed_versions() {
    let server = server();
    let lists = server.discovery();
    let versions: Vec<_> = lists.iter().map(|l| l.group_version.as_str()).collect();
    assert_eq!(versions, vec!["notes.io/v1", "notes.io/v2"]);
    let r = &lists[0].resources[0];
    assert_eq!((r.name.as_str(), r.kind.as_str(), r.namespaced), ("notes", "Note", true));
    assert!(r.verbs.iter().any(|v| v == "watch"));
    assert_eq!(server.storage("notes.io", "v3", "notes").err().map(|e| e.code()), Some(404));
}

#[tokio::test]
async fn dispatch_maps_verbs_and_errors() {
    let server = server();
    let cancel = CancellationToken::new();

    let (code, body) =
        object(server.handle(request(Verb::Create, "v1", None, Some(json!({"metadata": {"name": "a"}}))), cancel.clone()).await);
    assert_eq!(code, 201);
    assert_eq!(body["metadata"]["name"], "a");

    let (code, body) = object(server.handle(request(Verb::Create, "v1", None, Some(json!({"metadata": {"name": "a"}}))), cancel.clone()).await);
    assert_eq!(code, 409);
    assert_eq!(body["kind"], "Status");
    assert_eq!(body["reason"], "AlreadyExists");

    let (code, body) = object(server.handle(request(Verb::Get, "v2", Some("a"), None), cancel.clone()).await);
    assert_eq!(code, 200);
    assert_eq!(body["apiVersion"], "notes.io/v2");

    let (code, _) = object(server.handle(request(Verb::Get, "v1", None, None), cancel.clone()).await);
    assert_eq!(code, 400);

    let mut list = request(Verb::List, "v1", None, None);
    list.options = json!({"labelSelector": "tier in (web"});
    let (code, body) = object(server.handle(list, cancel.clone()).await);
    assert_eq!(code, 400);
    assert_eq!(body["reason"], "BadRequest");

    let (code, body) = object(server.handle(request(Verb::Delete, "v1", Some("a"), None), cancel.clone()).await);
    assert_eq!(code, 200);
    assert_eq!(body["metadata"]["name"], "a");

    let (code, body) = object(server.handle(request(Verb::Get, "v1", Some("a"), None), cancel.clone()).await);
    assert_eq!(code, 404);
    assert_eq!(body["details"]["name"], "a");

    let mut missing = request(Verb::Get, "v1", Some("a"), None);
    missing.resource = "memos".into();
    assert_eq!(object(server.handle(missing, cancel).await).0, 404);
}

#[test]
fn request_envelope_parses_from_wire_json() {
    let req: Request = serde_json::from_str(
        r#"{"verb":"list","group":"notes.io","version":"v1","resource":"notes","namespace":"default","options":{"limit":5}}"#,
    )
    .unwrap();
    assert_eq!(req.verb, Verb::List);
    assert_eq!(req.id, "");
    assert_eq!(req.options["limit"], 5);
}
