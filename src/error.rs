use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::mongodb::is_write_conflict;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    /// A voter, election, or candidate does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The request clashes with existing state, e.g. the voter has already voted.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The request is well-formed but not acceptable, e.g. a candidate from another election.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    /// The store failed or timed out; nothing was persisted and the request may be retried.
    #[error("Transient failure: {0}")]
    TransientFailure(String),
    #[error("Unexpected: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Is it safe and sensible for the caller to retry?
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientFailure(_) => true,
            Self::Db(err) => is_write_conflict(err),
            _ => false,
        }
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) => Status::Conflict,
            Self::ValidationFailed(_) => Status::UnprocessableEntity,
            Self::TransientFailure(_) => Status::ServiceUnavailable,
            Self::Db(_) if self.is_transient() => Status::ServiceUnavailable,
            Self::Db(_) | Self::Unexpected(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        Err(status)
    }
}
