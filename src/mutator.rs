//! Admin operations on questions and the active-question pointer.
//!
//! Specs are validated before anything is written, so a rejected request never
//! leaves a partial write behind. There is a single trusted admin, so pointer
//! updates are plain overwrites.

use chrono::Utc;
use log::info;

use crate::error::{Error, Result};
use crate::model::{question::QuestionEdit, ActivePointer, Question, QuestionSpec};
use crate::store::{self, Direction, DocumentStore, WriteMode};

/// Create a question, and make it the active one if `activate` is set.
pub async fn create_question(
    store: &dyn DocumentStore,
    spec: QuestionSpec,
    activate: bool,
) -> Result<Question> {
    let question = Question::new(spec.normalize()?, Utc::now());
    store::save(store, &question.id, &question, WriteMode::Replace).await?;
    info!("Created question {}", question.id);
    if activate {
        ActivePointer::new(question.id.clone()).save(store).await?;
        info!("Activated question {}", question.id);
    }
    Ok(question)
}

/// Replace the domain, text and options of an existing question.
pub async fn edit_question(
    store: &dyn DocumentStore,
    id: &str,
    spec: QuestionSpec,
) -> Result<Question> {
    let spec = spec.normalize()?;
    let mut question = store::fetch::<Question>(store, id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {id}")))?;
    question.apply_edit(spec, Utc::now());
    store::save(store, id, &QuestionEdit::from(&question), WriteMode::Merge).await?;
    info!("Edited question {id}");
    Ok(question)
}

/// Delete a question.
///
/// Its responses are left in place, as is the pointer: a pointer to a deleted
/// question simply reads as no active question.
pub async fn delete_question(store: &dyn DocumentStore, id: &str) -> Result<()> {
    if store::remove::<Question>(store, id).await? {
        info!("Deleted question {id}");
        Ok(())
    } else {
        Err(Error::not_found(format!("Question {id}")))
    }
}

/// Make an existing question the active one.
pub async fn activate_question(store: &dyn DocumentStore, id: &str) -> Result<Question> {
    let question = store::fetch::<Question>(store, id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {id}")))?;
    ActivePointer::new(question.id.clone()).save(store).await?;
    info!("Activated question {id}");
    Ok(question)
}

/// Close the live poll, if any.
pub async fn deactivate(store: &dyn DocumentStore) -> Result<()> {
    ActivePointer::default().save(store).await?;
    info!("Deactivated the active question");
    Ok(())
}

/// Every question, newest first.
pub async fn list_questions(store: &dyn DocumentStore) -> Result<Vec<Question>> {
    store::fetch_all(store, Some(("createdAt", Direction::Descending))).await
}

/// The question the pointer currently refers to, if it exists.
pub async fn active_question(store: &dyn DocumentStore) -> Result<Option<Question>> {
    ActivePointer::load(store).await?.resolve(store).await
}
