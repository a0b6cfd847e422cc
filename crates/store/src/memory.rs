//! In-memory MVCC backend: per-key version history for snapshot reads, a bounded
//! change log for watch resumption, and broadcast fan-out for live subscribers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::backend::{Backend, BackendError, BackendEvent, ChangeStream, KeyValue, RangePage};

pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Orders keys segment by segment, so `<root>/<ns>/<name>` sorts as
/// (namespace, name) even when a namespace contains `-` or `.`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathKey(String);

impl PathKey {
    fn new(key: &str) -> Self { Self(key.to_string()) }
}

impl Ord for PathKey {
    fn cmp(&self, other: &Self) -> Ordering { self.0.split('/').cmp(other.0.split('/')) }
}

impl PartialOrd for PathKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

#[derive(Debug, Clone)]
struct Version {
    create_revision: u64,
    mod_revision: u64,
    /// `None` marks a deletion.
    value: Option<Vec<u8>>,
}

impl Version {
    fn to_kv(&self, key: &str) -> Option<KeyValue> {
        self.value.as_ref().map(|v| KeyValue {
            key: key.to_string(),
            value: v.clone(),
            create_revision: self.create_revision,
            mod_revision: self.mod_revision,
        })
    }
}

struct Inner {
    revision: u64,
    /// Oldest revision still readable; watches must start at or after it.
    compacted: u64,
    keys: BTreeMap<PathKey, Vec<Version>>,
    log: VecDeque<BackendEvent>,
    history_limit: usize,
}

impl Inner {
    fn latest(&self, key: &str) -> Option<&Version> {
        self.keys.get(&PathKey::new(key)).and_then(|h| h.last()).filter(|v| v.value.is_some())
    }

    fn at(&self, key: &str, revision: u64) -> Option<&Version> {
        self.keys.get(&PathKey::new(key))?.iter().rev().find(|v| v.mod_revision <= revision).filter(|v| v.value.is_some())
    }

    fn compact(&mut self, revision: u64) {
        let revision = revision.min(self.revision);
        if revision <= self.compacted { return; }
        self.compacted = revision;
        while self.log.front().map(|e| e.revision <= revision).unwrap_or(false) {
            self.log.pop_front();
        }
        self.keys.retain(|_, history| {
            let keep_from = history.iter().rposition(|v| v.mod_revision <= revision).unwrap_or(0);
            history.drain(..keep_from);
            !(history.len() == 1 && history[0].value.is_none() && history[0].mod_revision <= revision)
        });
        debug!(revision, "memory backend: compacted");
    }

    fn record(&mut self, event: BackendEvent, tx: &broadcast::Sender<BackendEvent>) {
        let _ = tx.send(event.clone());
        self.log.push_back(event);
        if self.log.len() > self.history_limit {
            let floor = self.log[self.log.len() - self.history_limit - 1].revision;
            self.compact(floor);
        }
    }
}

/// Process-local backend. Cheap to construct; intended for tests and single-node runs.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<BackendEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self { Self::with_history_limit(DEFAULT_HISTORY_LIMIT) }
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    /// Retain at most `limit` change events; older history is compacted away.
    pub fn with_history_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        let (events, _) = broadcast::channel(limit);
        Self {
            inner: Mutex::new(Inner { revision: 0, compacted: 0, keys: BTreeMap::new(), log: VecDeque::new(), history_limit: limit }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard history at and below `revision`.
    pub fn compact(&self, revision: u64) { self.lock().compact(revision) }

    pub fn compacted_revision(&self) -> u64 { self.lock().compacted }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>, BackendError> {
        Ok(self.lock().latest(key).and_then(|v| v.to_kv(key)))
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KeyValue, BackendError> {
        let mut inner = self.lock();
        if inner.latest(key).is_some() {
            return Err(BackendError::KeyExists(key.to_string()));
        }
        inner.revision += 1;
        let rev = inner.revision;
        let version = Version { create_revision: rev, mod_revision: rev, value: Some(value) };
        let kv = version.to_kv(key).ok_or_else(|| BackendError::Unavailable("empty write".into()))?;
        inner.keys.entry(PathKey::new(key)).or_default().push(version);
        trace!(key, rev, "memory backend: create");
        inner.record(BackendEvent { revision: rev, key: key.to_string(), current: Some(kv.clone()), previous: None }, &self.events);
        Ok(kv)
    }

    async fn compare_and_swap(&self, key: &str, expected_revision: u64, value: Vec<u8>) -> Result<KeyValue, BackendError> {
        let mut inner = self.lock();
        let prev = match inner.latest(key) {
            Some(v) if v.mod_revision == expected_revision => v.clone(),
            Some(v) => return Err(BackendError::Conflict { key: key.to_string(), expected: expected_revision, actual: v.mod_revision }),
            None => return Err(BackendError::NotFound(key.to_string())),
        };
        inner.revision += 1;
        let rev = inner.revision;
        let version = Version { create_revision: prev.create_revision, mod_revision: rev, value: Some(value) };
        let kv = version.to_kv(key).ok_or_else(|| BackendError::Unavailable("empty write".into()))?;
        inner.keys.entry(PathKey::new(key)).or_default().push(version);
        trace!(key, rev, "memory backend: update");
        inner.record(
            BackendEvent { revision: rev, key: key.to_string(), current: Some(kv.clone()), previous: prev.to_kv(key) },
            &self.events,
        );
        Ok(kv)
    }

    async fn delete(&self, key: &str, expected_revision: u64) -> Result<KeyValue, BackendError> {
        let mut inner = self.lock();
        let prev = match inner.latest(key) {
            Some(v) if v.mod_revision == expected_revision => v.clone(),
            Some(v) => return Err(BackendError::Conflict { key: key.to_string(), expected: expected_revision, actual: v.mod_revision }),
            None => return Err(BackendError::NotFound(key.to_string())),
        };
        let prev_kv = prev.to_kv(key).ok_or_else(|| BackendError::NotFound(key.to_string()))?;
        inner.revision += 1;
        let rev = inner.revision;
        inner.keys.entry(PathKey::new(key)).or_default().push(Version { create_revision: prev.create_revision, mod_revision: rev, value: None });
        trace!(key, rev, "memory backend: delete");
        inner.record(BackendEvent { revision: rev, key: key.to_string(), current: None, previous: Some(prev_kv.clone()) }, &self.events);
        Ok(prev_kv)
    }

    async fn range(&self, prefix: &str, start_after: Option<&str>, limit: usize, revision: Option<u64>) -> Result<RangePage, BackendError> {
        let inner = self.lock();
        let rev = revision.unwrap_or(inner.revision);
        if rev < inner.compacted {
            return Err(BackendError::Compacted { requested: rev, floor: inner.compacted });
        }
        if rev > inner.revision {
            return Err(BackendError::FutureRevision { requested: rev, current: inner.revision });
        }
        let lower = match start_after {
            Some(start) => Bound::Excluded(PathKey::new(start)),
            None => Bound::Included(PathKey::new(prefix)),
        };
        let mut page = RangePage { items: Vec::new(), more: false, revision: rev };
        // keys under a prefix are contiguous in segment order
        for (PathKey(key), _) in inner.keys.range((lower, Bound::Unbounded)) {
            if !key.starts_with(prefix) { break; }
            let Some(kv) = inner.at(key, rev).and_then(|v| v.to_kv(key)) else { continue };
            if limit > 0 && page.items.len() == limit {
                page.more = true;
                break;
            }
            page.items.push(kv);
        }
        Ok(page)
    }

    async fn subscribe(&self, prefix: &str, from_revision: u64) -> Result<ChangeStream, BackendError> {
        // Subscribe while holding the lock so no commit falls between backlog and live feed.
        let (backlog, rx, start) = {
            let inner = self.lock();
            if from_revision < inner.compacted {
                return Err(BackendError::Compacted { requested: from_revision, floor: inner.compacted });
            }
            let rx = self.events.subscribe();
            let backlog: Vec<BackendEvent> = inner
                .log
                .iter()
                .filter(|e| e.revision > from_revision && e.key.starts_with(prefix))
                .cloned()
                .collect();
            (backlog, rx, from_revision.max(inner.revision))
        };
        debug!(prefix, from_revision, backlog = backlog.len(), "memory backend: subscribe");

        let prefix = prefix.to_string();
        let live = futures::stream::unfold(Some(rx), move |state| {
            let prefix = prefix.clone();
            async move {
                let mut rx = state?;
                loop {
                    match rx.recv().await {
                        Ok(ev) if ev.revision > start && ev.key.starts_with(&prefix) => return Some((Ok(ev), Some(rx))),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => return Some((Err(BackendError::Lagged(n)), None)),
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(futures::stream::iter(backlog.into_iter().map(Ok)).chain(live).boxed())
    }

    async fn current_revision(&self) -> Result<u64, BackendError> {
        Ok(self.lock().revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Vec<u8> { s.as_bytes().to_vec() }

    #[tokio::test]
    async fn create_cas_delete_bump_revisions() {
        let be = MemoryBackend::new();
        let kv = be.create("/a", b("1")).await.unwrap();
        assert_eq!((kv.create_revision, kv.mod_revision), (1, 1));
        assert_eq!(be.create("/a", b("x")).await, Err(BackendError::KeyExists("/a".into())));

        let kv2 = be.compare_and_swap("/a", 1, b("2")).await.unwrap();
        assert_eq!((kv2.create_revision, kv2.mod_revision), (1, 2));
        assert!(matches!(be.compare_and_swap("/a", 1, b("3")).await, Err(BackendError::Conflict { actual: 2, .. })));

        assert!(matches!(be.delete("/a", 1).await, Err(BackendError::Conflict { .. })));
        let gone = be.delete("/a", 2).await.unwrap();
        assert_eq!(gone.value, b("2"));
        assert_eq!(be.get("/a").await.unwrap(), None);
        assert_eq!(be.delete("/a", 3).await, Err(BackendError::NotFound("/a".into())));
        assert_eq!(be.current_revision().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn range_reads_snapshot_and_pages() {
        let be = MemoryBackend::new();
        for k in ["/p/a", "/p/b", "/p/c", "/q/a"] {
            be.create(k, b(k)).await.unwrap();
        }
        let page = be.range("/p/", None, 2, None).await.unwrap();
        assert_eq!(page.items.iter().map(|kv| kv.key.as_str()).collect::<Vec<_>>(), vec!["/p/a", "/p/b"]);
        assert!(page.more);
        let snap = page.revision;

        be.create("/p/bb", b("late")).await.unwrap();
        be.delete("/p/c", 3).await.unwrap();

        let rest = be.range("/p/", Some("/p/b"), 2, Some(snap)).await.unwrap();
        assert_eq!(rest.items.iter().map(|kv| kv.key.as_str()).collect::<Vec<_>>(), vec!["/p/c"]);
        assert!(!rest.more);

        let now = be.range("/p/", None, 0, None).await.unwrap();
        assert_eq!(now.items.iter().map(|kv| kv.key.as_str()).collect::<Vec<_>>(), vec!["/p/a", "/p/b", "/p/bb"]);
    }

    #[tokio::test]
    async fn range_orders_by_segment_not_by_byte() {
        let be = MemoryBackend::new();
        for k in ["/r/a-b/y", "/r/a/x", "/r/a.c/z", "/r/a/w"] {
            be.create(k, b(k)).await.unwrap();
        }
        let all = be.range("/r/", None, 0, None).await.unwrap();
        let keys: Vec<_> = all.items.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/r/a/w", "/r/a/x", "/r/a-b/y", "/r/a.c/z"]);

        let ns = be.range("/r/a/", None, 0, None).await.unwrap();
        assert_eq!(ns.items.iter().map(|kv| kv.key.as_str()).collect::<Vec<_>>(), vec!["/r/a/w", "/r/a/x"]);

        let next = be.range("/r/", Some("/r/a/x"), 1, None).await.unwrap();
        assert_eq!(next.items[0].key, "/r/a-b/y");
        assert!(next.more);
    }

    #[tokio::test]
    async fn compaction_bounds_reads_and_watches() {
        let be = MemoryBackend::with_history_limit(2);
        be.create("/k/a", b("1")).await.unwrap();
        be.compare_and_swap("/k/a", 1, b("2")).await.unwrap();
        be.compare_and_swap("/k/a", 2, b("3")).await.unwrap();
        assert_eq!(be.compacted_revision(), 1);
        assert!(matches!(be.subscribe("/k/", 0).await, Err(BackendError::Compacted { floor: 1, .. })));
        assert!(be.subscribe("/k/", 1).await.is_ok());
        assert!(matches!(be.range("/k/", None, 0, Some(0)).await, Err(BackendError::Compacted { .. })));
        let at1 = be.range("/k/", None, 0, Some(1)).await.unwrap();
        assert_eq!(at1.items[0].value, b("1"));
    }

    #[tokio::test]
    async fn subscribe_replays_backlog_then_follows_live() {
        let be = MemoryBackend::new();
        be.create("/w/a", b("1")).await.unwrap();
        be.create("/other/x", b("1")).await.unwrap();
        be.compare_and_swap("/w/a", 1, b("2")).await.unwrap();

        let mut stream = be.subscribe("/w/", 0).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.revision, 1);
        assert!(first.previous.is_none());
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.revision, 3);
        assert_eq!(second.previous.as_ref().map(|p| p.value.clone()), Some(b("1")));

        be.delete("/w/a", 3).await.unwrap();
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.revision, 4);
        assert!(third.current.is_none());
    }
}
