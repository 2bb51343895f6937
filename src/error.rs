use log::{debug, error};
use mongodb::{
    bson::{de::Error as BsonDeError, ser::Error as BsonSerError},
    error::Error as DbError,
};
use rocket::{
    http::{Status, StatusClass},
    response::Responder,
};
use thiserror::Error;

use crate::model::question::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    BsonSer(#[from] BsonSerError),
    #[error(transparent)]
    BsonDe(#[from] BsonDeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid question: {0}")]
    Validation(#[from] ValidationError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// Shorthand for a 404 with the given description of what was missing.
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {}", what.as_ref()))
    }

    /// Shorthand for a 400 with the given reason.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, reason.into())
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::BsonSer(_) | Self::BsonDe(_) | Self::Io(_) => {
                Status::InternalServerError
            }
            Self::Validation(_) => Status::BadRequest,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("{self}"),
            _ => debug!("{self}"),
        }
        Err(status)
    }
}
