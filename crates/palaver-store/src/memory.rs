//! In-process [`ReplicaStore`] implementation.
//!
//! Collections are `BTreeMap`s of JSON documents keyed by id. There is no
//! replication; observers registered against a collection are re-delivered
//! the full result set of their query after every write that touches it.
//! Used by tests and by local single-process sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use palaver_shared::{AttachmentToken, CollectionId};

use crate::error::{Result, StoreError};
use crate::handle::LiveHandle;
use crate::query::{Filter, Query, Statement};
use crate::{FetchEvent, ReplicaStore};

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<CollectionId, BTreeMap<String, Value>>,
    observers: Vec<Observer>,
    subscriptions: Vec<LiveHandle>,
    blobs: HashMap<AttachmentToken, Vec<u8>>,
    fail_writes: bool,
}

struct Observer {
    query: Query,
    tx: mpsc::UnboundedSender<Vec<Value>>,
    handle: LiveHandle,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make every subsequent write statement fail with
    /// [`StoreError::WriteRejected`]. Lets tests simulate persistence
    /// rejection without a remote peer.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }

    /// Seed attachment bytes for a token.
    pub fn insert_blob(&self, token: AttachmentToken, bytes: Vec<u8>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.blobs.insert(token, bytes);
        }
    }

    /// Number of observers that are still deliverable.
    pub fn active_observer_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .observers
                    .iter()
                    .filter(|o| !o.handle.is_cancelled())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of replication subscriptions that have not been cancelled.
    pub fn active_subscription_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .subscriptions
                    .iter()
                    .filter(|s| !s.is_cancelled())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of documents in a collection; test introspection.
    pub fn collection_size(&self, collection: &CollectionId) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.collections.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Point read without going through `execute`; test introspection.
    pub fn document(&self, collection: &CollectionId, id: &str) -> Option<Value> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.collections.get(collection)?.get(id).cloned())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplicaStore for MemoryStore {
    async fn execute(&self, statement: Statement) -> Result<Vec<Value>> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Closed)?;

        if statement.is_write() && inner.fail_writes {
            return Err(StoreError::WriteRejected);
        }

        match statement {
            Statement::Upsert {
                collection,
                document,
            } => {
                let id = document
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or(StoreError::MissingDocumentId)?
                    .to_string();
                inner
                    .collections
                    .entry(collection.clone())
                    .or_default()
                    .insert(id, document.clone());
                notify_collection(&mut inner, &collection);
                Ok(vec![document])
            }
            Statement::Patch {
                collection,
                id,
                fields,
            } => {
                let updated = inner
                    .collections
                    .get_mut(&collection)
                    .and_then(|docs| docs.get_mut(&id))
                    .and_then(|doc| {
                        let obj = doc.as_object_mut()?;
                        for (key, value) in fields {
                            obj.insert(key, value);
                        }
                        Some(doc.clone())
                    });
                match updated {
                    Some(doc) => {
                        notify_collection(&mut inner, &collection);
                        Ok(vec![doc])
                    }
                    None => Ok(Vec::new()),
                }
            }
            Statement::SelectById { collection, id } => Ok(inner
                .collections
                .get(&collection)
                .and_then(|docs| docs.get(&id))
                .cloned()
                .into_iter()
                .collect()),
        }
    }

    fn register_subscription(&self, query: Query) -> Result<LiveHandle> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Closed)?;
        debug!(collection = %query.collection, "registering replication subscription");
        let handle = LiveHandle::new();
        inner.subscriptions.push(handle.clone());
        Ok(handle)
    }

    fn register_observer(
        &self,
        query: Query,
    ) -> Result<(LiveHandle, mpsc::UnboundedReceiver<Vec<Value>>)> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Closed)?;
        debug!(collection = %query.collection, "registering change observer");

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = LiveHandle::new();

        // Live query semantics: deliver the current view right away.
        let rows = evaluate(inner.collections.get(&query.collection), &query.filter);
        let _ = tx.send(rows);

        inner.observers.push(Observer {
            query,
            tx,
            handle: handle.clone(),
        });
        Ok((handle, rx))
    }

    fn fetch_attachment(
        &self,
        token: &AttachmentToken,
    ) -> Result<mpsc::UnboundedReceiver<FetchEvent>> {
        let inner = self.inner.lock().map_err(|_| StoreError::Closed)?;
        let (tx, rx) = mpsc::unbounded_channel();

        match inner.blobs.get(token) {
            Some(bytes) => {
                let total = bytes.len() as u64;
                let _ = tx.send(FetchEvent::Progress {
                    transferred: total / 2,
                    total,
                });
                let _ = tx.send(FetchEvent::Progress {
                    transferred: total,
                    total,
                });
                let _ = tx.send(FetchEvent::Complete {
                    bytes: bytes.clone(),
                });
            }
            None => {
                let _ = tx.send(FetchEvent::Failed {
                    reason: format!("unknown attachment token: {}", token.as_str()),
                });
            }
        }
        Ok(rx)
    }
}

/// Re-deliver every live observer of a collection its current result set.
/// Observers that were cancelled or whose receiver is gone are pruned.
fn notify_collection(inner: &mut Inner, collection: &CollectionId) {
    let Inner {
        collections,
        observers,
        ..
    } = inner;
    observers.retain(|obs| {
        if obs.handle.is_cancelled() {
            return false;
        }
        if &obs.query.collection != collection {
            return true;
        }
        let rows = evaluate(collections.get(&obs.query.collection), &obs.query.filter);
        obs.tx.send(rows).is_ok()
    });
}

fn evaluate(docs: Option<&BTreeMap<String, Value>>, filter: &Filter) -> Vec<Value> {
    let Some(docs) = docs else {
        return Vec::new();
    };
    match filter {
        Filter::All => docs.values().cloned().collect(),
        Filter::VisibleMessagesSince { room_id, cutoff } => {
            let mut rows: Vec<(DateTime<Utc>, Value)> = docs
                .values()
                .filter_map(|doc| {
                    if doc.get("roomId").and_then(Value::as_str) != Some(room_id.as_str()) {
                        return None;
                    }
                    if doc.get("isArchived").and_then(Value::as_bool).unwrap_or(false) {
                        return None;
                    }
                    let created = doc
                        .get("createdOn")
                        .and_then(Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))?;
                    (created >= *cutoff).then(|| (created, doc.clone()))
                })
                .collect();
            rows.sort_by_key(|(created, _)| *created);
            rows.into_iter().map(|(_, doc)| doc).collect()
        }
        Filter::DirectRoomsWith { user_id } => docs
            .values()
            .filter(|doc| {
                doc.get("participants")
                    .and_then(Value::as_array)
                    .map(|ps| ps.iter().any(|p| p.as_str() == Some(user_id.as_str())))
                    .unwrap_or(false)
            })
            .cloned()
            .collect(),
    }
}
