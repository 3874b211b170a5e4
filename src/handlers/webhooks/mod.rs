pub mod coins;
pub mod events;
pub mod orders;
pub mod shop;
pub mod stripe;
pub mod subscriptions;

pub use stripe::handle_stripe_webhook;

use axum::{routing::post, Router};
use serde::Serialize;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/stripe", post(handle_stripe_webhook))
}

/// What processing an event amounted to. Every variant acknowledges with
/// 200 - Stripe only needs to know the delivery landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Effects were applied by this delivery.
    Applied,
    /// A previous delivery already applied the effects; this one changed
    /// nothing.
    Duplicate,
    /// Recognized but deliberately not acted on.
    Ignored(&'static str),
}

/// JSON acknowledgement body returned to Stripe.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<&'static str>,
}

impl From<Disposition> for WebhookAck {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Applied => WebhookAck {
                received: true,
                duplicate: None,
                ignored: None,
            },
            Disposition::Duplicate => WebhookAck {
                received: true,
                duplicate: Some(true),
                ignored: None,
            },
            Disposition::Ignored(reason) => WebhookAck {
                received: true,
                duplicate: None,
                ignored: Some(reason),
            },
        }
    }
}
