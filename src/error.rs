// src/error.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Central error type for all request handlers.
///
/// The first three variants surface to the caller without any mutation
/// having happened; `Database`/`Bson` cover driver failures mid-operation.
/// Best-effort side effects (match creation, sibling sweep, broadcasts)
/// never travel through this type; they are logged and swallowed at the
/// call site.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input or an unknown referenced document: score out of
    /// range, inverted time window, bad email, creating against a post
    /// or match that does not exist.
    #[error("validation error: {0}")]
    Validation(String),

    /// Well-formed request that loses against current state or
    /// membership: duplicate rating triple, unconfirmed match, actor
    /// outside the roster, state-machine precondition miss.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lookup of the addressed document by id came back empty.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Storage/driver failure.
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// Failure converting a value into a BSON document.
    #[error("serialization error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    /// Anything else that should surface as a 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Bson(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::Validation("bad score".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("already rated".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::NotFound("post").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message_names_the_resource() {
        assert_eq!(ApiError::NotFound("conversation").to_string(), "conversation not found");
    }
}
