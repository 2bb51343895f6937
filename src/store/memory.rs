use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mongodb::bson::{Bson, Document};
use rocket::futures::{stream, StreamExt};
use rocket::tokio::sync::{watch, Mutex, RwLock};

use super::{CollectionSnapshots, Direction, DocumentSnapshots, DocumentStore, WriteMode};
use crate::error::{Error, Result};

type Collection = BTreeMap<String, Document>;

#[derive(Default)]
struct Inner {
    collections: RwLock<HashMap<String, Collection>>,
    /// One revision counter per collection, bumped on every write.
    revisions: Mutex<HashMap<String, watch::Sender<u64>>>,
}

impl Inner {
    async fn subscribe(&self, collection: &str) -> watch::Receiver<u64> {
        let mut revisions = self.revisions.lock().await;
        revisions
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    async fn bump(&self, collection: &str) {
        if let Some(revision) = self.revisions.lock().await.get(collection) {
            revision.send_modify(|r| *r += 1);
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    async fn list(&self, collection: &str, order_by: Option<(&str, Direction)>) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        if let Some((field, direction)) = order_by {
            docs.sort_by(|a, b| {
                let ordering = compare_bson(a.get(field), b.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        docs
    }
}

/// Order field values the way MongoDB sorts the common scalar types; a missing
/// field sorts first and mismatched types compare equal.
fn compare_bson(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => a.cmp(b),
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::Int32(a)), Some(Bson::Int32(b))) => a.cmp(b),
        (Some(Bson::Int64(a)), Some(Bson::Int64(b))) => a.cmp(b),
        (Some(Bson::Double(a)), Some(Bson::Double(b))) => a.total_cmp(b),
        (None | Some(Bson::Null), Some(b)) if !matches!(b, Bson::Null) => Ordering::Less,
        (Some(a), None | Some(Bson::Null)) if !matches!(a, Bson::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A process-local store, used in tests and for running the server without a
/// database. Nothing is persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.inner.get(collection, id).await)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        mut doc: Document,
        mode: WriteMode,
    ) -> Result<()> {
        {
            let mut collections = self.inner.collections.write().await;
            let docs = collections.entry(collection.to_string()).or_default();
            match (mode, docs.get_mut(id)) {
                (WriteMode::Replace, _) => {
                    doc.insert("_id", id);
                    docs.insert(id.to_string(), doc);
                }
                (WriteMode::Merge, Some(existing)) => {
                    doc.remove("_id");
                    for (key, value) in doc {
                        existing.insert(key, value);
                    }
                }
                (WriteMode::Merge, None) => {
                    return Err(Error::not_found(format!("{collection}/{id}")));
                }
            }
        }
        self.inner.bump(collection).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let existed = self
            .inner
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if existed {
            self.inner.bump(collection).await;
        }
        Ok(existed)
    }

    async fn list(
        &self,
        collection: &str,
        order_by: Option<(&str, Direction)>,
    ) -> Result<Vec<Document>> {
        Ok(self.inner.list(collection, order_by).await)
    }

    async fn watch_document(&self, collection: &str, id: &str) -> Result<DocumentSnapshots> {
        let inner = self.inner.clone();
        let collection = collection.to_string();
        let id = id.to_string();
        let revision = inner.subscribe(&collection).await;
        let snapshots = stream::unfold(
            (inner, collection, id, revision, None),
            |(inner, collection, id, mut revision, last)| async move {
                loop {
                    // The first snapshot is emitted straight away.
                    if last.is_some() && revision.changed().await.is_err() {
                        return None;
                    }
                    revision.borrow_and_update();
                    let current = inner.get(&collection, &id).await;
                    // Writes to other documents in the collection also bump the revision.
                    if last.as_ref() != Some(&current) {
                        let state = (inner, collection, id, revision, Some(current.clone()));
                        return Some((Ok(current), state));
                    }
                }
            },
        );
        Ok(snapshots.boxed())
    }

    async fn watch_collection(&self, collection: &str) -> Result<CollectionSnapshots> {
        let inner = self.inner.clone();
        let collection = collection.to_string();
        let revision = inner.subscribe(&collection).await;
        let snapshots = stream::unfold(
            (inner, collection, revision, true),
            |(inner, collection, mut revision, first)| async move {
                if !first && revision.changed().await.is_err() {
                    return None;
                }
                revision.borrow_and_update();
                let docs = inner.list(&collection, None).await;
                Some((Ok(docs), (inner, collection, revision, false)))
            },
        );
        Ok(snapshots.boxed())
    }
}
