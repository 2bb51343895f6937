use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoredDocument;

use super::bson::optional_chrono_datetime;

/// Question IDs are opaque strings; new ones are hex-encoded ObjectIds.
pub type QuestionId = String;

/// A question must offer at least this many non-blank options.
pub const MIN_OPTIONS: usize = 2;

/// Reasons a question specification is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Domain is required")]
    MissingDomain,
    #[error("Question text is required")]
    MissingText,
    #[error("At least {} non-blank options are required", MIN_OPTIONS)]
    TooFewOptions,
}

/// A question as submitted by the admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Subject area the question belongs to.
    pub domain: String,
    /// The question itself.
    pub text: String,
    /// Options to be rated, in display order.
    pub options: Vec<String>,
}

impl QuestionSpec {
    /// Trim every field and drop blank options.
    ///
    /// Fails if the domain or text end up empty, or fewer than [`MIN_OPTIONS`]
    /// options remain.
    pub fn normalize(self) -> Result<Self, ValidationError> {
        let domain = self.domain.trim().to_string();
        if domain.is_empty() {
            return Err(ValidationError::MissingDomain);
        }
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(ValidationError::MissingText);
        }
        let options: Vec<String> = self
            .options
            .iter()
            .map(|option| option.trim())
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect();
        if options.len() < MIN_OPTIONS {
            return Err(ValidationError::TooFewOptions);
        }
        Ok(Self {
            domain,
            text,
            options,
        })
    }
}

/// Core question data, as stored in the `questions` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCore {
    pub domain: String,
    pub text: String,
    pub options: Vec<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_chrono_datetime"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A question from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    #[serde(flatten)]
    pub question: QuestionCore,
}

impl Question {
    /// Create a brand new question from an already-normalized spec.
    pub fn new(spec: QuestionSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ObjectId::new().to_hex(),
            question: QuestionCore {
                domain: spec.domain,
                text: spec.text,
                options: spec.options,
                created_at,
                updated_at: None,
            },
        }
    }

    /// Replace the editable fields with those of `spec`.
    pub fn apply_edit(&mut self, spec: QuestionSpec, updated_at: DateTime<Utc>) {
        self.question.domain = spec.domain;
        self.question.text = spec.text;
        self.question.options = spec.options;
        self.question.updated_at = Some(updated_at);
    }
}

impl Deref for Question {
    type Target = QuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

impl DerefMut for Question {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.question
    }
}

impl StoredDocument for Question {
    const COLLECTION: &'static str = "questions";
}

/// The fields written by an edit, merged into the existing document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEdit<'a> {
    pub domain: &'a str,
    pub text: &'a str,
    pub options: &'a [String],
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument for QuestionEdit<'_> {
    const COLLECTION: &'static str = Question::COLLECTION;
}

impl<'a> From<&'a Question> for QuestionEdit<'a> {
    fn from(question: &'a Question) -> Self {
        Self {
            domain: &question.domain,
            text: &question.text,
            options: &question.options,
            updated_at: question.updated_at.unwrap_or(question.created_at),
        }
    }
}

/// API-friendly representation of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: QuestionId,
    pub domain: String,
    pub text: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            domain: question.question.domain,
            text: question.question.text,
            options: question.question.options,
            created_at: question.question.created_at,
            updated_at: question.question.updated_at,
        }
    }
}
