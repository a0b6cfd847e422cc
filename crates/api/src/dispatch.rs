//! Transport-neutral request envelope and its dispatch onto installed storages.

use std::fmt;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use foundry_core::{ApiError, ApiResult, RequestContext, UserInfo};

use crate::rest::{EventStream, WriteResponse};
use crate::server::ApiServer;
use crate::status::status_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Update,
    Delete,
    Get,
    List,
    Watch,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Watch => "watch",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// An already-routed, already-authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Echoed back so callers can correlate replies and watch frames.
    #[serde(default)]
    pub id: String,
    pub verb: Verb,
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    /// Verb options in wire form: `dryRun`, `labelSelector`, `limit`, `continue`, ...
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

pub enum Reply {
    Object { code: u16, body: Value, warnings: Vec<String> },
    /// Frames until the request is cancelled or the watch fails.
    Watch(EventStream),
}

impl Reply {
    fn ok(body: Value) -> Self { Reply::Object { code: 200, body, warnings: Vec::new() } }

    fn written(res: WriteResponse) -> Self {
        Reply::Object { code: res.code(), body: res.object, warnings: res.warnings }
    }

    pub fn failure(err: &ApiError) -> Self {
        Reply::Object { code: err.code(), body: status_json(err), warnings: Vec::new() }
    }

    pub fn code(&self) -> u16 {
        match self {
            Reply::Object { code, .. } => *code,
            Reply::Watch(_) => 200,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Object { code, body, warnings } => {
                f.debug_struct("Object").field("code", code).field("body", body).field("warnings", warnings).finish()
            }
            Reply::Watch(_) => f.write_str("Watch(..)"),
        }
    }
}

fn options<O: DeserializeOwned + Default>(raw: &Value) -> ApiResult<O> {
    if raw.is_null() {
        return Ok(O::default());
    }
    serde_json::from_value(raw.clone()).map_err(|e| ApiError::bad_request(format!("invalid options: {e}")))
}

impl ApiServer {
    /// Run one request to completion; errors come back as a `Status` body.
    pub async fn handle(&self, req: Request, cancel: CancellationToken) -> Reply {
        let t0 = Instant::now();
        let (verb, resource) = (req.verb, req.resource.clone());
        let reply = match self.dispatch(req, cancel).await {
            Ok(reply) => reply,
            Err(e) => {
                info!(verb = %verb, resource = %resource, code = e.code(), error = %e, "api: request failed");
                Reply::failure(&e)
            }
        };
        let code = reply.code();
        counter!("foundry_api_requests_total", 1, "verb" => verb.as_str(), "code" => code.to_string());
        histogram!("foundry_api_request_ms", t0.elapsed().as_secs_f64() * 1000.0, "verb" => verb.as_str());
        debug!(verb = %verb, resource = %resource, code, took_ms = %t0.elapsed().as_millis(), "api: request done");
        reply
    }

    async fn dispatch(&self, req: Request, cancel: CancellationToken) -> ApiResult<Reply> {
        let Request { verb, group, version, resource, namespace, name, body, options: raw, user, .. } = req;
        let storage = self.storage(&group, &version, &resource)?;
        let mut ctx = RequestContext::new().with_cancellation(cancel);
        if let Some(ns) = namespace {
            ctx = ctx.with_namespace(ns);
        }
        if let Some(user) = user {
            ctx = ctx.with_user(user);
        }
        let name = name.filter(|n| !n.is_empty());
        let need_name = || name.as_deref().ok_or_else(|| ApiError::bad_request(format!("{verb} requires a resource name")));
        let need_body = |body: Option<Value>| body.ok_or_else(|| ApiError::bad_request(format!("{verb} requires a request body")));

        Ok(match verb {
            Verb::Create => Reply::written(storage.create(&ctx, need_body(body)?, &options(&raw)?).await?),
            Verb::Update => Reply::written(storage.update(&ctx, need_name()?, need_body(body)?, &options(&raw)?).await?),
            Verb::Delete => Reply::ok(storage.delete(&ctx, need_name()?, &options(&raw)?).await?),
            Verb::Get => Reply::ok(storage.get(&ctx, need_name()?).await?),
            Verb::List => Reply::ok(storage.list(&ctx, &options(&raw)?).await?),
            Verb::Watch => Reply::Watch(storage.watch(&ctx, &options(&raw)?).await?),
        })
    }
}
