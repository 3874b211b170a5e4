use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Request arrived without the provider signature header.
    #[error("Missing stripe-signature header")]
    MissingSignature,

    /// Signature did not match the payload, or the timestamp was outside tolerance.
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// Server-side misconfiguration: no webhook secret available.
    /// Distinct from a caller error - this signals an operational problem.
    #[error("Webhook secret is not configured")]
    MissingWebhookSecret,

    /// The event payload is structurally invalid or missing fields that the
    /// provider will never supply on retry.
    #[error("Bad event: {0}")]
    BadEvent(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A synchronous lookup against the payment provider API failed.
    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::MissingSignature => (StatusCode::BAD_REQUEST, "Missing signature", None),
            AppError::InvalidSignature => (StatusCode::BAD_REQUEST, "Invalid signature", None),
            AppError::MissingWebhookSecret => {
                tracing::error!("Stripe webhook secret is not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook not configured",
                    None,
                )
            }
            AppError::BadEvent(msg) => (StatusCode::BAD_REQUEST, "Bad event", Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string())),
            AppError::Provider(msg) => {
                tracing::error!("Provider API error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
