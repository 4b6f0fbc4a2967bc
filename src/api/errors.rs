use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::attempts::AttemptError;
use crate::services::quiz_authoring::AuthoringError;
use crate::services::quiz_excel::ImportError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => {
                let status = StatusCode::FORBIDDEN;
                (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response()
            }
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::NotFound(message) => {
                let status = StatusCode::NOT_FOUND;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::Conflict(message) => {
                let status = StatusCode::CONFLICT;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::PayloadTooLarge(message) => {
                let status = StatusCode::PAYLOAD_TOO_LARGE;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::TooManyRequests(message) => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                let status = StatusCode::SERVICE_UNAVAILABLE;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
        }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        let message = err.to_string();
        match err {
            AttemptError::QuizNotFound
            | AttemptError::AttemptNotFound
            | AttemptError::QuestionNotFound
            | AttemptError::ChoiceNotFound => ApiError::NotFound(message),
            AttemptError::NotAStudent => ApiError::Forbidden("Only students can take quizzes"),
            AttemptError::WrongClass => {
                ApiError::Forbidden("This quiz is not assigned to your class")
            }
            AttemptError::RetakeNotAllowed => ApiError::Forbidden("You cannot retake this quiz."),
            AttemptError::NotOwner => ApiError::Forbidden("Access denied"),
            AttemptError::QuizNotActive
            | AttemptError::PreviousTimedOut
            | AttemptError::AttemptClosed
            | AttemptError::AlreadySubmitted
            | AttemptError::TimeElapsed => ApiError::BadRequest(message),
            AttemptError::Database(err) => ApiError::internal(err, "Failed to update attempt"),
        }
    }
}

impl From<AuthoringError> for ApiError {
    fn from(err: AuthoringError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_body_carries_status_and_detail() {
        let response = ApiError::BadRequest("Quiz not active.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = crate::test_support::read_json(response).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["detail"], "Quiz not active.");
    }

    #[test]
    fn unauthorized_sets_bearer_challenge() {
        let response = ApiError::Unauthorized("Invalid authentication credentials").into_response();
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[test]
    fn attempt_errors_map_to_statuses() {
        let status = |err: AttemptError| ApiError::from(err).into_response().status();
        assert_eq!(status(AttemptError::QuizNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(AttemptError::WrongClass), StatusCode::FORBIDDEN);
        assert_eq!(status(AttemptError::RetakeNotAllowed), StatusCode::FORBIDDEN);
        assert_eq!(status(AttemptError::AlreadySubmitted), StatusCode::BAD_REQUEST);
        assert_eq!(status(AttemptError::TimeElapsed), StatusCode::BAD_REQUEST);
    }
}
