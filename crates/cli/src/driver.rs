//! Line-delimited JSON driver: one request per stdin line, one reply per stdout
//! line. Watches stream `{id, event}` lines until cancelled with `{"cancel": id}`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use foundry_api::{ApiServer, Reply, Request, Verb};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const OUTPUT_CAP: usize = 1024;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Line {
    Cancel { cancel: String },
    Request(Box<Request>),
}

/// Open watches by request id. The sequence number keeps a finished watch from
/// evicting a newer one that reused its id.
#[derive(Default, Clone)]
struct Watches(Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>);

impl Watches {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, id: &str, seq: u64, token: CancellationToken) { self.lock().insert(id.to_string(), (seq, token)); }

    fn cancel(&self, id: &str) -> bool {
        match self.lock().remove(id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn close(&self, id: &str, seq: u64) {
        let mut open = self.lock();
        if open.get(id).map(|(s, _)| *s == seq).unwrap_or(false) {
            open.remove(id);
        }
    }

    fn len(&self) -> usize { self.lock().len() }
}

async fn write_lines<W: AsyncWrite + Unpin>(mut out: W, mut rx: mpsc::Receiver<Value>) -> Result<()> {
    while let Some(v) = rx.recv().await {
        let mut line = serde_json::to_vec(&v)?;
        line.push(b'\n');
        out.write_all(&line).await.context("write reply")?;
        out.flush().await.context("flush reply")?;
    }
    Ok(())
}

/// Handle one request; a watch keeps its task alive while frames are forwarded.
async fn serve_one(
    server: Arc<ApiServer>,
    req: Request,
    seq: u64,
    token: CancellationToken,
    tx: mpsc::Sender<Value>,
    watches: Watches,
) {
    let id = req.id.clone();
    let is_watch = req.verb == Verb::Watch;
    match server.handle(req, token).await {
        Reply::Object { code, body, warnings } => {
            tx.send(json!({ "id": id, "code": code, "body": body, "warnings": warnings })).await.ok();
        }
        Reply::Watch(mut frames) => {
            tx.send(json!({ "id": id, "code": 200, "watching": true })).await.ok();
            let mut sent = 0usize;
            while let Some(frame) = frames.next().await {
                if tx.send(json!({ "id": id, "event": frame })).await.is_err() {
                    break;
                }
                sent += 1;
            }
            debug!(id = %id, sent, "driver: watch closed");
            tx.send(json!({ "id": id, "done": true })).await.ok();
        }
    }
    if is_watch {
        watches.close(&id, seq);
    }
}

pub async fn run(server: Arc<ApiServer>, shutdown: CancellationToken) -> Result<()> {
    serve(server, BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown).await
}

/// Serve requests from `input` until EOF or `shutdown`; returns once every
/// in-flight request and open watch has ended.
pub async fn serve<R, W>(server: Arc<ApiServer>, input: R, output: W, shutdown: CancellationToken) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Value>(OUTPUT_CAP);
    let writer = tokio::spawn(write_lines(output, rx));
    let mut lines = input.lines();
    let watches = Watches::default();
    let mut served = 0u64;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("read request")?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Line>(line) {
            Err(e) => {
                warn!(error = %e, "driver: malformed request");
                tx.send(json!({ "error": format!("malformed request: {e}") })).await.ok();
            }
            Ok(Line::Cancel { cancel }) => {
                if !watches.cancel(&cancel) {
                    debug!(id = %cancel, "driver: cancel for unknown watch");
                }
            }
            Ok(Line::Request(req)) => {
                served += 1;
                let token = shutdown.child_token();
                if req.verb == Verb::Watch {
                    watches.open(&req.id, served, token.clone());
                }
                tokio::spawn(serve_one(server.clone(), *req, served, token, tx.clone(), watches.clone()));
            }
        }
    }

    info!(served, open_watches = watches.len(), "driver: input closed");
    drop(tx);
    writer.await.context("join writer")??;
    Ok(())
}
