//! Catwalk - payment reconciliation service for a modeling marketplace
//!
//! This library provides the webhook reconciliation core: Stripe event
//! verification, typed event decoding, idempotent ledger mutations, and the
//! fallback synthesis of purchase records from event metadata.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod payments;

use axum::{routing::get, Router};

use db::AppState;

/// Build the full application router. Shared by the binary and the
/// integration tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(handlers::webhooks::router())
        .with_state(state)
}
