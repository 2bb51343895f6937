use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoredDocument;

use super::{client_id::ClientId, question::QuestionId};

/// Document ID of the response by `client_id` to `question_id`.
///
/// Deterministic so that a participant can hold at most one response per question:
/// submitting again overwrites the earlier document.
pub fn response_id(question_id: &str, client_id: &ClientId) -> String {
    format!("{question_id}_{client_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Rating {0} is outside {}..={}", Rating::MIN, Rating::MAX)]
pub struct RatingOutOfRange(pub u8);

/// A single rating on the 5-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based histogram bucket for this rating.
    pub fn bucket(self) -> usize {
        usize::from(self.0 - Self::MIN)
    }
}

impl TryFrom<u8> for Rating {
    type Error = RatingOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RatingOutOfRange(value))
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl Display for Rating {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete response, as written by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub question_id: QuestionId,
    /// One rating per option, index-aligned with the question's options.
    pub ratings: Vec<Rating>,
    pub client_id: ClientId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Response {
    pub fn new(question_id: QuestionId, client_id: ClientId, ratings: Vec<Rating>) -> Self {
        Self {
            question_id,
            ratings,
            client_id,
            created_at: Utc::now(),
        }
    }

    /// The document ID this response is stored under.
    pub fn id(&self) -> String {
        response_id(&self.question_id, &self.client_id)
    }
}

impl StoredDocument for Response {
    const COLLECTION: &'static str = "responses";
}

/// A response as found in the database.
///
/// Nothing guarantees that documents in the `responses` collection are well formed,
/// so the fields the aggregation depends on are kept as raw BSON and interpreted
/// leniently. Deserializing this type never fails.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredResponse {
    pub question_id: Bson,
    pub ratings: Bson,
}

impl StoredResponse {
    /// Does this response refer to the given question?
    pub fn answers(&self, question_id: &str) -> bool {
        matches!(&self.question_id, Bson::String(id) if id == question_id)
    }

    /// The ratings array, if the field is an array at all.
    pub fn ratings(&self) -> Option<&[Bson]> {
        match &self.ratings {
            Bson::Array(ratings) => Some(ratings),
            _ => None,
        }
    }
}

impl StoredDocument for StoredResponse {
    const COLLECTION: &'static str = Response::COLLECTION;
}

impl From<&Response> for StoredResponse {
    fn from(response: &Response) -> Self {
        Self {
            question_id: Bson::String(response.question_id.clone()),
            ratings: Bson::Array(
                response
                    .ratings
                    .iter()
                    .map(|rating| Bson::Int32(rating.get().into()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson::{doc, from_document, to_document};

    fn ratings(values: &[u8]) -> Vec<Rating> {
        values
            .iter()
            .map(|value| Rating::try_from(*value).unwrap())
            .collect()
    }

    #[test]
    fn rating_range() {
        assert_eq!(Rating::try_from(0), Err(RatingOutOfRange(0)));
        assert_eq!(Rating::try_from(6), Err(RatingOutOfRange(6)));
        assert_eq!(Rating::try_from(1).unwrap().bucket(), 0);
        assert_eq!(Rating::try_from(5).unwrap().bucket(), 4);
        assert_eq!(
            RatingOutOfRange(9).to_string(),
            "Rating 9 is outside 1..=5"
        );
    }

    #[test]
    fn deterministic_id() {
        let client_id = ClientId::from("c0ffee".to_string());
        let response = Response::new("q1".to_string(), client_id.clone(), ratings(&[5, 1]));
        assert_eq!(response.id(), "q1_c0ffee");
        assert_eq!(response_id("q1", &client_id), response.id());
    }

    #[test]
    fn document_shape() {
        let client_id = ClientId::from("abc".to_string());
        let response = Response::new("q1".to_string(), client_id, ratings(&[3, 4]));
        let doc = to_document(&response).unwrap();
        assert_eq!(doc.get_str("questionId").unwrap(), "q1");
        assert_eq!(doc.get_str("clientId").unwrap(), "abc");
        assert_eq!(
            doc.get_array("ratings").unwrap(),
            &vec![Bson::Int32(3), Bson::Int32(4)]
        );

        let stored: StoredResponse = from_document(doc).unwrap();
        assert!(stored.answers("q1"));
        assert_eq!(stored, StoredResponse::from(&response));
    }

    #[test]
    fn out_of_range_rating_is_rejected_when_strict() {
        let doc = doc! {
            "questionId": "q1",
            "ratings": [3, 9],
            "clientId": "abc",
            "createdAt": mongodb::bson::DateTime::now(),
        };
        assert!(from_document::<Response>(doc).is_err());
    }

    #[test]
    fn stored_response_tolerates_anything() {
        let stored: StoredResponse = from_document(doc! {
            "questionId": 42,
            "ratings": "not an array",
        })
        .unwrap();
        assert!(!stored.answers("42"));
        assert!(stored.ratings().is_none());

        let stored: StoredResponse = from_document(doc! {}).unwrap();
        assert_eq!(stored.question_id, Bson::Null);
        assert!(stored.ratings().is_none());
    }
}
