use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No room is registered under the requested code.
    #[error("no such room: {0}")]
    RoomNotFound(String),
    /// The room is past the lobby and no seat can be reclaimed.
    #[error("room locked: {0}")]
    RoomLocked(String),
    /// Start preconditions are not met.
    #[error("cannot start: {0}")]
    InvalidStartState(String),
    /// The connection lacks the role required by the command.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The answer targets a question that is no longer open.
    #[error("stale submission: {0}")]
    StaleSubmission(String),
    /// A freshly generated room code is already taken.
    #[error("room code already in use: {0}")]
    DuplicateCode(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The room actor or a backend is gone.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Wire error codes carried by failed acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unknown room code.
    NoSuchRoom,
    /// Join refused after the lobby.
    RoomLocked,
    /// Start preconditions failed.
    InvalidStartState,
    /// Role check failed.
    Forbidden,
    /// Answer for a closed question.
    StaleSubmission,
    /// Malformed or out-of-range payload.
    InvalidInput,
    /// Command not valid in the current stage.
    InvalidState,
    /// Room actor gone or code space exhausted.
    Unavailable,
}

impl ServiceError {
    /// Wire code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::RoomNotFound(_) => ErrorCode::NoSuchRoom,
            ServiceError::RoomLocked(_) => ErrorCode::RoomLocked,
            ServiceError::InvalidStartState(_) => ErrorCode::InvalidStartState,
            ServiceError::Forbidden(_) => ErrorCode::Forbidden,
            ServiceError::StaleSubmission(_) => ErrorCode::StaleSubmission,
            ServiceError::InvalidInput(_) => ErrorCode::InvalidInput,
            ServiceError::InvalidState(_) => ErrorCode::InvalidState,
            ServiceError::DuplicateCode(_) | ServiceError::Unavailable(_) => {
                ErrorCode::Unavailable
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidQuery(message) => ServiceError::InvalidInput(message),
            err @ StorageError::Rejected { .. } => ServiceError::Unavailable(err.to_string()),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RoomNotFound(message) => AppError::NotFound(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::RoomLocked(message)
            | ServiceError::InvalidStartState(message)
            | ServiceError::StaleSubmission(message)
            | ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::DuplicateCode(message) | ServiceError::Unavailable(message) => {
                AppError::ServiceUnavailable(message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Stage, StageEvent};

    #[test]
    fn duplicate_code_is_reported_as_unavailable() {
        let err = ServiceError::DuplicateCode("ABCD".into());
        assert_eq!(err.code(), ErrorCode::Unavailable);
    }

    #[test]
    fn invalid_transition_maps_to_invalid_state() {
        let err: ServiceError = InvalidTransition {
            from: Stage::Lobby,
            event: StageEvent::ShowResults,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[test]
    fn error_codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NoSuchRoom).unwrap();
        assert_eq!(json, "\"NO_SUCH_ROOM\"");
        let json = serde_json::to_string(&ErrorCode::InvalidStartState).unwrap();
        assert_eq!(json, "\"INVALID_START_STATE\"");
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = AppError::from(ServiceError::RoomNotFound("ZZZZ".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
