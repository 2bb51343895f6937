//! Documents of the poll collections.
//!
//! Types here are serialised the way they are stored:
//!
//! - field names are camelCase, as the collections are shared with other clients;
//! - timestamps are BSON datetimes;
//! - document IDs live in `_id`.
//!
//! Types with a `View` suffix are the JSON representations returned by the API.

mod bson;

pub mod client_id;
pub mod pointer;
pub mod question;
pub mod response;

pub use client_id::ClientId;
pub use pointer::ActivePointer;
pub use question::{Question, QuestionId, QuestionSpec, QuestionView, ValidationError};
pub use response::{response_id, Rating, Response, StoredResponse};
