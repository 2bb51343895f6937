use log::{debug, info};
use mongodb::{
    bson::{doc, Document},
    options::{FindOptions, ReplaceOptions},
    Client, Collection, Database,
};
use rocket::futures::{stream, StreamExt, TryStreamExt};

use super::{CollectionSnapshots, Direction, DocumentSnapshots, DocumentStore, WriteMode};
use crate::error::{Error, Result};

/// A store backed by a MongoDB database.
///
/// Subscriptions are built on change streams, so the deployment must be a
/// replica set (a single-node one is fine).
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect to the server at `uri` and use the database called `name`.
    pub async fn connect(uri: &str, name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        info!("Connected to MongoDB, using database {name}");
        Ok(Self::new(client.database(name)))
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

fn id_filter(id: &str) -> Document {
    doc! { "_id": id }
}

async fn find_all(
    collection: &Collection<Document>,
    order_by: Option<(&str, Direction)>,
) -> Result<Vec<Document>> {
    let sort = order_by.map(|(field, direction)| {
        let order = match direction {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        };
        doc! { field: order }
    });
    let options = FindOptions::builder().sort(sort).build();
    Ok(collection.find(None, options).await?.try_collect().await?)
}

#[rocket::async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.collection(collection).find_one(id_filter(id), None).await?)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        mut doc: Document,
        mode: WriteMode,
    ) -> Result<()> {
        let collection = self.collection(collection);
        match mode {
            WriteMode::Replace => {
                doc.insert("_id", id);
                let options = ReplaceOptions::builder().upsert(true).build();
                collection.replace_one(id_filter(id), doc, options).await?;
            }
            WriteMode::Merge => {
                doc.remove("_id");
                // An empty `$set` is rejected by the server.
                let matched = if doc.is_empty() {
                    collection.count_documents(id_filter(id), None).await? > 0
                } else {
                    let update = doc! { "$set": doc };
                    let result = collection.update_one(id_filter(id), update, None).await?;
                    result.matched_count > 0
                };
                if !matched {
                    return Err(Error::not_found(format!("{}/{id}", collection.name())));
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = self
            .collection(collection)
            .delete_one(id_filter(id), None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn list(
        &self,
        collection: &str,
        order_by: Option<(&str, Direction)>,
    ) -> Result<Vec<Document>> {
        find_all(&self.collection(collection), order_by).await
    }

    async fn watch_document(&self, collection: &str, id: &str) -> Result<DocumentSnapshots> {
        let collection = self.collection(collection);
        let id = id.to_string();
        // Open the change stream before the first read so no change can slip in between.
        let pipeline = [doc! { "$match": { "documentKey._id": &id } }];
        let changes = Box::pin(collection.watch(pipeline, None).await?);
        debug!("Watching {}/{id}", collection.name());
        let snapshots = stream::unfold(
            (collection, id, changes, true),
            |(collection, id, mut changes, first)| async move {
                if !first {
                    match changes.next().await? {
                        Ok(_) => {}
                        Err(e) => return Some((Err(e.into()), (collection, id, changes, false))),
                    }
                }
                let snapshot = collection
                    .find_one(id_filter(&id), None)
                    .await
                    .map_err(Into::into);
                Some((snapshot, (collection, id, changes, false)))
            },
        );
        Ok(snapshots.boxed())
    }

    async fn watch_collection(&self, collection: &str) -> Result<CollectionSnapshots> {
        let collection = self.collection(collection);
        let changes = Box::pin(collection.watch(Vec::<Document>::new(), None).await?);
        debug!("Watching {}", collection.name());
        let snapshots = stream::unfold(
            (collection, changes, true),
            |(collection, mut changes, first)| async move {
                if !first {
                    match changes.next().await? {
                        Ok(_) => {}
                        Err(e) => return Some((Err(e.into()), (collection, changes, false))),
                    }
                }
                let snapshot = find_all(&collection, None).await;
                Some((snapshot, (collection, changes, false)))
            },
        );
        Ok(snapshots.boxed())
    }
}
