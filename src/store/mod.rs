//! The document store the poll state lives in.
//!
//! Documents are addressed by collection name and string ID, and are always
//! returned with that ID in their `_id` field. Besides point reads and writes,
//! a store can push snapshots: subscribing to a document or collection yields
//! its current content immediately, then a fresh snapshot after every change.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use std::sync::Arc;

use mongodb::bson::{from_document, to_document, Document};
use rocket::futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Snapshots of a single document; `None` while it does not exist.
pub type DocumentSnapshots = BoxStream<'static, Result<Option<Document>>>;

/// Snapshots of an entire collection.
pub type CollectionSnapshots = BoxStream<'static, Result<Vec<Document>>>;

/// A shared handle on a store, as kept in managed state.
pub type Store = Arc<dyn DocumentStore>;

/// How a write treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole document.
    Replace,
    /// Overwrite only the given top-level fields, keeping the rest. The
    /// document must already exist; otherwise the write fails with a 404.
    Merge,
}

/// Sort direction for collection enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[rocket::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a single document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Write a single document. A replace creates it if necessary.
    async fn set(&self, collection: &str, id: &str, doc: Document, mode: WriteMode) -> Result<()>;

    /// Delete a single document. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Read every document in a collection, optionally sorted by a top-level field.
    async fn list(
        &self,
        collection: &str,
        order_by: Option<(&str, Direction)>,
    ) -> Result<Vec<Document>>;

    /// Subscribe to a single document.
    async fn watch_document(&self, collection: &str, id: &str) -> Result<DocumentSnapshots>;

    /// Subscribe to an entire collection.
    async fn watch_collection(&self, collection: &str) -> Result<CollectionSnapshots>;
}

/// A type that lives in a known collection.
pub trait StoredDocument {
    /// The name of the collection.
    const COLLECTION: &'static str;
}

/// Decode a document read from the store.
pub fn decode<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(from_document(doc)?)
}

/// Read and decode a single document.
pub async fn fetch<T>(store: &dyn DocumentStore, id: &str) -> Result<Option<T>>
where
    T: StoredDocument + DeserializeOwned,
{
    store.get(T::COLLECTION, id).await?.map(decode).transpose()
}

/// Read and decode a whole collection.
pub async fn fetch_all<T>(
    store: &dyn DocumentStore,
    order_by: Option<(&str, Direction)>,
) -> Result<Vec<T>>
where
    T: StoredDocument + DeserializeOwned,
{
    store
        .list(T::COLLECTION, order_by)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

/// Encode and write a single document.
pub async fn save<T>(store: &dyn DocumentStore, id: &str, value: &T, mode: WriteMode) -> Result<()>
where
    T: StoredDocument + Serialize + Sync,
{
    let doc = to_document(value)?;
    store.set(T::COLLECTION, id, doc, mode).await
}

/// Delete a single document. Returns whether it existed.
pub async fn remove<T: StoredDocument>(store: &dyn DocumentStore, id: &str) -> Result<bool> {
    store.delete(T::COLLECTION, id).await
}
