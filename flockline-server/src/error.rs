//! HTTP mapping of command failures.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flockline::CommandError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;
use tracing::{error, warn};

/// Error returned by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A command or query failed.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The request body was not the expected JSON.
    #[error("Invalid request body: {0}")]
    Body(String),
}

impl ApiError {
    /// Validation failure on a named request field.
    pub fn validation(field: impl Into<String>, reason: impl Display) -> Self {
        Self::Command(CommandError::validation(field, reason))
    }

    /// The HTTP status this error is reported with.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Command(error) => match error {
                CommandError::Validation { .. }
                | CommandError::InvalidState(_)
                | CommandError::BusinessRuleViolation(_)
                | CommandError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                CommandError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                CommandError::Forbidden(_) => StatusCode::FORBIDDEN,
                CommandError::NotFound { .. } => StatusCode::NOT_FOUND,
                CommandError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
                CommandError::Store(_) | CommandError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Command(CommandError::Validation { field, reason }) => ErrorBody {
                error: reason.clone(),
                field: Some(field.clone()),
            },
            Self::Command(
                CommandError::BusinessRuleViolation(message)
                | CommandError::Unauthorized(message)
                | CommandError::Forbidden(message),
            ) => ErrorBody {
                error: message.clone(),
                field: None,
            },
            _ if status.is_server_error() => {
                error!(error = %self, "[api.error] request failed");
                ErrorBody {
                    error: "Internal server error".to_string(),
                    field: None,
                }
            }
            _ => {
                if status == StatusCode::CONFLICT {
                    warn!(error = %self, "[api.error] retries exhausted");
                }
                ErrorBody {
                    error: self.to_string(),
                    field: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejection is an [`ApiError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Converts a value-constructor result, attributing failures to `field`.
pub fn validated<T, E: Display>(field: &str, result: Result<T, E>) -> Result<T, ApiError> {
    result.map_err(|error| ApiError::validation(field, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flockline::StoreError;
    use tracing_test::traced_test;

    #[test]
    fn business_failures_are_client_errors() {
        let cases = [
            (CommandError::validation("price", "must be positive"), 400),
            (CommandError::InvalidState("order is shipped".into()), 400),
            (
                CommandError::InsufficientStock {
                    product: "Sasso chicks".into(),
                    requested: 5,
                    available: 1,
                },
                400,
            ),
            (CommandError::Unauthorized("no token".into()), 401),
            (CommandError::Forbidden("admins only".into()), 403),
            (CommandError::not_found("Order", "x"), 404),
            (
                CommandError::ConcurrencyConflict { documents: vec![] },
                409,
            ),
            (
                CommandError::Store(StoreError::ConnectionFailed("down".into())),
                500,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status().as_u16(), expected);
        }
    }

    #[test]
    fn validated_names_the_field() {
        let result: Result<u32, ApiError> = validated("quantity", Err::<u32, _>("too large"));
        assert!(matches!(
            result,
            Err(ApiError::Command(CommandError::Validation { ref field, .. })) if field == "quantity"
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn store_failures_are_logged_but_not_echoed() {
        let error = ApiError::from(CommandError::Store(StoreError::ConnectionFailed(
            "password authentication failed for user flockline".into(),
        )));

        let response = error.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("body is JSON");

        assert_eq!(body, serde_json::json!({ "error": "Internal server error" }));
        assert!(logs_contain("[api.error] request failed"));
    }

    #[tokio::test]
    async fn validation_errors_name_the_field() {
        let response = ApiError::validation("price", "must be positive").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("body is JSON");

        assert_eq!(
            body,
            serde_json::json!({ "error": "must be positive", "field": "price" })
        );
    }
}
