use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, DocumentStore, StoredDocument, WriteMode};

use super::question::{Question, QuestionId};

/// The singleton document naming the question currently open to participants.
///
/// A `None` question ID means no poll is live.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePointer {
    #[serde(default)]
    pub question_id: Option<QuestionId>,
}

impl StoredDocument for ActivePointer {
    const COLLECTION: &'static str = "active";
}

impl ActivePointer {
    /// ID of the singleton document within [`ActivePointer::COLLECTION`].
    pub const ID: &'static str = "question";

    pub fn new(question_id: impl Into<Option<QuestionId>>) -> Self {
        Self {
            question_id: question_id.into(),
        }
    }

    /// Read the current pointer. A missing document reads as "no active question".
    pub async fn load(store: &dyn DocumentStore) -> Result<Self> {
        Ok(store::fetch::<Self>(store, Self::ID)
            .await?
            .unwrap_or_default())
    }

    /// Overwrite the pointer.
    pub async fn save(&self, store: &dyn DocumentStore) -> Result<()> {
        store::save(store, Self::ID, self, WriteMode::Replace).await
    }

    /// Resolve the pointer to the question it names.
    ///
    /// A pointer referencing a question that no longer exists resolves to `None`,
    /// exactly as if no question were active.
    pub async fn resolve(&self, store: &dyn DocumentStore) -> Result<Option<Question>> {
        let question_id = match &self.question_id {
            Some(id) => id,
            None => return Ok(None),
        };
        let question = store::fetch::<Question>(store, question_id).await?;
        if question.is_none() {
            debug!("Active pointer references missing question {question_id}");
        }
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStore;

    #[rocket::async_test]
    async fn missing_pointer_is_inactive() {
        let store = MemoryStore::new();
        assert_eq!(ActivePointer::load(&store).await.unwrap(), ActivePointer::default());
        assert!(ActivePointer::default()
            .resolve(&store)
            .await
            .unwrap()
            .is_none());
    }

    #[rocket::async_test]
    async fn resolve_follows_pointer() {
        let store = MemoryStore::new();
        let question = Question::example1();
        store::save(&store, &question.id, &question, WriteMode::Replace)
            .await
            .unwrap();

        let pointer = ActivePointer::new(question.id.clone());
        pointer.save(&store).await.unwrap();
        let loaded = ActivePointer::load(&store).await.unwrap();
        assert_eq!(loaded, pointer);
        let resolved = loaded.resolve(&store).await.unwrap().unwrap();
        assert_eq!(resolved.id, question.id);

        // Deleting the question leaves a dangling pointer, which reads as inactive.
        store::remove::<Question>(&store, &question.id).await.unwrap();
        assert!(loaded.resolve(&store).await.unwrap().is_none());
    }
}
