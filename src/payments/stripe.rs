use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
/// Stripe recommends 300 seconds (5 minutes).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verify a Stripe webhook signature header against the raw request body.
///
/// Returns `Ok(false)` for a well-formed header that fails verification
/// (bad signature, stale timestamp); a malformed header is an error so the
/// caller can reject it as a bad request.
pub fn verify_webhook_signature(
    webhook_secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<bool> {
    // Stripe signature format: t=timestamp,v1=signature
    let parts: Vec<&str> = signature.split(',').collect();

    let mut timestamp = None;
    let mut sig_v1 = None;

    for part in parts {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            sig_v1 = Some(s);
        }
    }

    let timestamp_str = timestamp.ok_or(AppError::InvalidSignature)?;
    let sig_v1 = sig_v1.ok_or(AppError::InvalidSignature)?;

    // Parse and validate timestamp to prevent replay attacks.
    // Reject webhooks older than WEBHOOK_TIMESTAMP_TOLERANCE_SECS.
    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::InvalidSignature)?;

    let now = chrono::Utc::now().timestamp();
    let age = now - timestamp;

    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
            age,
            WEBHOOK_TIMESTAMP_TOLERANCE_SECS
        );
        return Ok(false);
    }

    // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
    if age < -60 {
        tracing::warn!(
            "Stripe webhook rejected: timestamp in the future (age={}s)",
            age
        );
        return Ok(false);
    }

    // Construct signed payload
    let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

    // Compute expected signature
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| AppError::Internal("invalid webhook secret".into()))?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    // Constant-time comparison to prevent timing attacks.
    let expected_bytes = expected.as_bytes();
    let provided_bytes = sig_v1.as_bytes();

    // Length check is not constant-time, but signature length is not secret
    // (always 64 hex chars for SHA-256).
    if expected_bytes.len() != provided_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(provided_bytes).into())
}

/// Build a valid `Stripe-Signature` header for a payload. Used by tests and
/// local tooling to exercise the verification path.
pub fn sign_payload(webhook_secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

// ============ Wire types ============

/// Generic Stripe webhook event - `data.object` is parsed based on event_type.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>, // "payment" or "subscription"
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub subscription: Option<String>, // Present for subscription mode
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// ============ invoice.paid / invoice.payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub billing_reason: Option<String>, // "subscription_create", "subscription_cycle", etc.
    pub status: Option<String>,
    pub amount_paid: Option<i64>,
}

// ============ customer.subscription.updated / deleted ============

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionObject {
    pub id: String,
    pub customer: Option<String>,
    pub status: String, // "active", "past_due", "canceled", etc.
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: Option<bool>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// ============ payment_intent.succeeded / payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub amount: Option<i64>,
    pub latest_charge: Option<String>,
    pub last_payment_error: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// ============ Provider API handle ============

/// The few synchronous Stripe lookups the webhook handlers need. Injected as
/// a trait object so tests can substitute a canned implementation instead of
/// calling out to the network.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Re-fetch a subscription to read its authoritative metadata and
    /// current state. Renewal invoices do not carry the subscription's
    /// metadata, so the grant path needs this.
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<StripeSubscriptionObject>;

    /// Resolve the charge id behind a payment intent, for order records.
    async fn fetch_charge_id(&self, payment_intent_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("Stripe API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse Stripe response: {}", e)))
    }
}

#[async_trait]
impl ProviderApi for StripeClient {
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<StripeSubscriptionObject> {
        self.get_json(&format!(
            "https://api.stripe.com/v1/subscriptions/{}",
            subscription_id
        ))
        .await
    }

    async fn fetch_charge_id(&self, payment_intent_id: &str) -> Result<Option<String>> {
        let intent: StripePaymentIntent = self
            .get_json(&format!(
                "https://api.stripe.com/v1/payment_intents/{}",
                payment_intent_id
            ))
            .await?;
        Ok(intent.latest_charge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign_payload(SECRET, payload, chrono::Utc::now().timestamp());
        assert!(verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = b"{}";
        let header = sign_payload("whsec_other", payload, chrono::Utc::now().timestamp());
        assert!(!verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = sign_payload(SECRET, b"{\"amount\":100}", chrono::Utc::now().timestamp());
        assert!(!verify_webhook_signature(SECRET, b"{\"amount\":999}", &header).unwrap());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = b"{}";
        let old = chrono::Utc::now().timestamp() - 600;
        let header = sign_payload(SECRET, payload, old);
        assert!(!verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn rejects_future_timestamp() {
        let payload = b"{}";
        let future = chrono::Utc::now().timestamp() + 300;
        let header = sign_payload(SECRET, payload, future);
        assert!(!verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn malformed_header_is_an_error() {
        assert!(verify_webhook_signature(SECRET, b"{}", "not-a-signature").is_err());
        assert!(verify_webhook_signature(SECRET, b"{}", "t=abc,v1=def").is_err());
    }
}
