//! Test utilities and fixtures for Catwalk integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use http_body_util::BodyExt;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tower::ServiceExt;

pub use catwalk::db::{init_db, queries, AppState};
pub use catwalk::error::{AppError, Result};
pub use catwalk::models::*;
pub use catwalk::payments::{sign_payload, ProviderApi, StripeSubscriptionObject};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Canned provider API responses, in place of live Stripe lookups.
#[derive(Default)]
pub struct FakeProvider {
    pub subscriptions: Mutex<HashMap<String, StripeSubscriptionObject>>,
    pub charges: Mutex<HashMap<String, String>>,
}

impl FakeProvider {
    pub fn with_subscription(
        self,
        subscription_id: &str,
        status: &str,
        metadata: serde_json::Value,
        current_period_end: Option<i64>,
    ) -> Self {
        let object: StripeSubscriptionObject = serde_json::from_value(serde_json::json!({
            "id": subscription_id,
            "status": status,
            "current_period_end": current_period_end,
            "metadata": metadata,
        }))
        .expect("valid subscription object");
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription_id.to_string(), object);
        self
    }

    pub fn with_charge(self, payment_intent_id: &str, charge_id: &str) -> Self {
        self.charges
            .lock()
            .unwrap()
            .insert(payment_intent_id.to_string(), charge_id.to_string());
        self
    }
}

#[async_trait]
impl ProviderApi for FakeProvider {
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<StripeSubscriptionObject> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| AppError::Provider(format!("no such subscription: {}", subscription_id)))
    }

    async fn fetch_charge_id(&self, payment_intent_id: &str) -> Result<Option<String>> {
        Ok(self.charges.lock().unwrap().get(payment_intent_id).cloned())
    }
}

/// App state over an in-memory database. Pool size is 1 so every handler
/// call sees the same in-memory database.
pub fn setup_state_with_provider(provider: Arc<dyn ProviderApi>) -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to build test pool");
    {
        let conn = pool.get().expect("Failed to get test connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    AppState {
        db: pool,
        provider,
        webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
    }
}

pub fn setup_state() -> AppState {
    setup_state_with_provider(Arc::new(FakeProvider::default()))
}

pub fn test_app(state: AppState) -> Router {
    catwalk::app(state)
}

/// POST a signed event body to the webhook endpoint, returning the HTTP
/// status and the parsed response body.
pub async fn post_webhook(
    app: &Router,
    event: serde_json::Value,
) -> (axum::http::StatusCode, serde_json::Value) {
    let body = event.to_string();
    let signature = sign_payload(
        TEST_WEBHOOK_SECRET,
        body.as_bytes(),
        chrono::Utc::now().timestamp(),
    );
    post_webhook_raw(app, body, Some(&signature)).await
}

pub async fn post_webhook_raw(
    app: &Router,
    body: String,
    signature: Option<&str>,
) -> (axum::http::StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("stripe-signature", sig);
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Build a webhook event envelope.
pub fn event(event_type: &str, object: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object }
    })
}

/// A `checkout.session.completed` event for a paid session.
pub fn checkout_event(session_id: &str, mut object: serde_json::Value) -> serde_json::Value {
    let base = object.as_object_mut().expect("session object");
    base.insert("id".into(), serde_json::json!(session_id));
    base.entry("payment_status")
        .or_insert(serde_json::json!("paid"));
    event("checkout.session.completed", object)
}

// ============ Fixtures ============

pub fn create_test_user(state: &AppState, email: &str) -> User {
    let conn = state.db.get().unwrap();
    queries::create_user(&conn, email, "Test User").expect("Failed to create test user")
}

pub fn create_test_model(state: &AppState, rate: f64) -> (User, ReferrerModel) {
    let conn = state.db.get().unwrap();
    let user = queries::create_user(
        &conn,
        &format!("model-{}@test.local", uuid::Uuid::new_v4().simple()),
        "Test Model",
    )
    .expect("Failed to create model user");
    let model =
        queries::create_model(&conn, &user.id, "Test Model", rate).expect("Failed to create model");
    (user, model)
}

pub fn seed_tier(state: &AppState, tier: &str, monthly_coins: i64) {
    let conn = state.db.get().unwrap();
    queries::upsert_tier(&conn, tier, monthly_coins).expect("Failed to seed tier");
}

pub fn coin_balance(state: &AppState, user_id: &str) -> i64 {
    let conn = state.db.get().unwrap();
    queries::get_coin_balance(&conn, user_id)
        .expect("Failed to read balance")
        .expect("user exists")
}

pub fn ledger_count(state: &AppState, user_id: &str) -> i64 {
    let conn = state.db.get().unwrap();
    queries::count_ledger_for_user(&conn, user_id).expect("Failed to count ledger")
}
