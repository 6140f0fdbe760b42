//! Client-visible error taxonomy.
//!
//! Every failure surfaced over HTTP or a realtime channel carries a stable
//! `code` plus a human-readable message. Engine rule violations arrive as
//! [`GameError`] and map to the `state` code unchanged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::game::GameError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request field.
    #[error("{0}")]
    Validation(String),
    /// Unknown lobby or game.
    #[error("{0}")]
    NotFound(String),
    /// Missing username cookie, not a member, or a full lobby.
    #[error("{0}")]
    Unauthorized(String),
    /// Non-host attempting a host-only action.
    #[error("{0}")]
    Forbidden(String),
    /// Username already taken within the lobby.
    #[error("{0}")]
    Conflict(String),
    /// MAX_LOBBIES or MAX_ACTIVE_GAMES exceeded.
    #[error("{0}")]
    Capacity(String),
    /// Client over its request budget.
    #[error("rate limit exceeded")]
    RateLimited,
    /// Action illegal in the current game state.
    #[error(transparent)]
    State(#[from] GameError),
    /// Anything else. Logged; never leaks detail to the client.
    #[error("internal server error")]
    Internal(String),
}

/// Wire shape of an error, shared by HTTP bodies and socket `error` events.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not-found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::Capacity(_) => "capacity",
            ApiError::RateLimited => "rate-limited",
            ApiError::State(_) => "state",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::State(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Payload for socket `error` events and HTTP bodies.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload { code: self.code(), message: self.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!("internal error: {detail}");
        }
        (self.status(), Json(self.payload())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameError;

    #[test]
    fn codes_and_statuses_line_up() {
        assert_eq!(ApiError::Validation("x".into()).code(), "validation");
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Capacity("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        let err: ApiError = GameError::NotYourTurn.into();
        assert_eq!(err.code(), "state");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ApiError::Internal("secret backtrace".into());
        assert_eq!(err.payload().message, "internal server error");
    }
}
