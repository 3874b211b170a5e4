//! Decoding of raw Stripe events into a closed set of typed events.
//!
//! All payload interpretation happens here, at the boundary. The dispatch
//! code downstream matches on these types exhaustively, so adding a variant
//! forces every consumer to handle it.

use crate::error::{AppError, Result};
use crate::models::PaymentPlan;
use crate::payments::{
    StripeCheckoutSession, StripeEvent, StripeInvoice, StripePaymentIntent,
    StripeSubscriptionObject,
};

/// A Stripe event decoded into the shapes the reconciler acts on.
#[derive(Debug)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutIntent),
    /// A paid renewal invoice (`billing_reason = subscription_cycle`).
    SubscriptionRenewed(RenewalData),
    InvoicePaymentFailed { subscription_id: String },
    SubscriptionUpdated(StripeSubscriptionObject),
    SubscriptionDeleted { subscription_id: String },
    InstallmentChargeSucceeded(InstallmentCharge),
    InstallmentChargeFailed(InstallmentCharge),
    /// Recognized as noise: unknown event type, or a payload this service
    /// deliberately does not act on. Always acknowledged with 200.
    Ignored(&'static str),
}

/// What a completed checkout session was for, per its `metadata.type`.
#[derive(Debug)]
pub enum CheckoutIntent {
    /// No `metadata.type`: the default flow, a coin top-up.
    CoinPurchase {
        session_id: String,
        user_id: String,
        coins: i64,
    },
    Subscription {
        session_id: String,
        user_id: String,
        tier: String,
        billing_cycle: Option<String>,
        subscription_id: String,
        customer_id: Option<String>,
    },
    TripApplication {
        application_id: String,
        amount_cents: i64,
    },
    CreatorHouse {
        application_id: String,
        amount_cents: i64,
    },
    TicketPurchase(TicketCheckout),
    WorkshopRegistration(WorkshopCheckout),
    ContentProgram {
        session_id: String,
        program_id: String,
        user_id: String,
    },
    CompCardPrint {
        order_id: String,
    },
    ShopOrder {
        order_id: String,
        payment_intent: Option<String>,
    },
}

/// Ticket checkout data. Carries enough metadata to synthesize the purchase
/// row if the client-created pending one is missing.
#[derive(Debug)]
pub struct TicketCheckout {
    pub session_id: String,
    pub event_id: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub tier: Option<String>,
    pub quantity: i64,
    pub amount_total: Option<i64>,
    pub referrer_model_id: Option<String>,
}

#[derive(Debug)]
pub struct WorkshopCheckout {
    pub session_id: String,
    pub workshop_id: Option<String>,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub payment_plan: PaymentPlan,
    pub amount_total: Option<i64>,
    pub customer_id: Option<String>,
}

#[derive(Debug)]
pub struct RenewalData {
    pub invoice_id: String,
    pub subscription_id: String,
}

#[derive(Debug)]
pub struct InstallmentCharge {
    pub registration_id: String,
    pub installment_number: i64,
}

/// Decode a raw Stripe event into a typed one.
///
/// Decode failures split two ways. The coin-purchase flow is strict: bad
/// metadata there means real money was taken with no way to credit it, so it
/// surfaces as a 400 and Stripe retries (giving an operator time to fix the
/// flow). Everything else degrades to `Ignored` with a warning: those rows
/// are client-created and reconcilable later, and a 400 would just cause a
/// retry storm over data that will never parse.
pub fn decode_event(event: &StripeEvent) -> Result<WebhookEvent> {
    match event.event_type.as_str() {
        "checkout.session.completed" => decode_checkout_completed(event),
        "invoice.paid" => decode_invoice_paid(event),
        "invoice.payment_failed" => decode_invoice_payment_failed(event),
        "customer.subscription.updated" => decode_subscription_updated(event),
        "customer.subscription.deleted" => decode_subscription_deleted(event),
        "payment_intent.succeeded" => decode_installment(event, true),
        "payment_intent.payment_failed" => decode_installment(event, false),
        _ => Ok(WebhookEvent::Ignored("unhandled event type")),
    }
}

fn decode_checkout_completed(event: &StripeEvent) -> Result<WebhookEvent> {
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadEvent(format!("invalid checkout session: {}", e)))?;

    // Async payment methods send checkout.session.completed before the
    // payment settles; those sessions come back via
    // checkout.session.async_payment_succeeded, which we don't serve.
    if session.payment_status.as_deref() == Some("unpaid") {
        return Ok(WebhookEvent::Ignored("checkout session unpaid"));
    }

    let meta = &session.metadata;
    let kind = meta.get("type").map(String::as_str);

    let intent = match kind {
        // No discriminator: the default coin top-up flow. Strict.
        None | Some("coin_purchase") => {
            let user_id = meta
                .get("user_id")
                .ok_or_else(|| AppError::BadEvent("coin purchase missing user_id".into()))?;
            let coins: i64 = meta
                .get("coins")
                .ok_or_else(|| AppError::BadEvent("coin purchase missing coins".into()))?
                .parse()
                .map_err(|_| AppError::BadEvent("coin purchase has non-numeric coins".into()))?;
            if coins <= 0 {
                return Err(AppError::BadEvent("coin purchase has non-positive coins".into()));
            }
            CheckoutIntent::CoinPurchase {
                session_id: session.id.clone(),
                user_id: user_id.clone(),
                coins,
            }
        }

        Some("subscription") => {
            let (Some(user_id), Some(tier)) = (meta.get("user_id"), meta.get("tier")) else {
                tracing::warn!(session = %session.id, "subscription checkout missing user_id/tier metadata");
                return Ok(WebhookEvent::Ignored("subscription checkout missing metadata"));
            };
            let Some(subscription_id) = session.subscription.clone() else {
                tracing::warn!(session = %session.id, "subscription checkout has no subscription id");
                return Ok(WebhookEvent::Ignored("subscription checkout missing subscription id"));
            };
            CheckoutIntent::Subscription {
                session_id: session.id.clone(),
                user_id: user_id.clone(),
                tier: tier.clone(),
                billing_cycle: meta.get("billing_cycle").cloned(),
                subscription_id,
                customer_id: session.customer.clone(),
            }
        }

        Some("trip_application") => {
            let Some(application_id) = meta.get("application_id") else {
                tracing::warn!(session = %session.id, "trip checkout missing application_id");
                return Ok(WebhookEvent::Ignored("trip checkout missing application_id"));
            };
            CheckoutIntent::TripApplication {
                application_id: application_id.clone(),
                amount_cents: session.amount_total.unwrap_or(0),
            }
        }

        Some("creator_house") => {
            let Some(application_id) = meta.get("application_id") else {
                tracing::warn!(session = %session.id, "creator house checkout missing application_id");
                return Ok(WebhookEvent::Ignored("creator house checkout missing application_id"));
            };
            CheckoutIntent::CreatorHouse {
                application_id: application_id.clone(),
                amount_cents: session.amount_total.unwrap_or(0),
            }
        }

        Some("ticket_purchase") => CheckoutIntent::TicketPurchase(TicketCheckout {
            session_id: session.id.clone(),
            event_id: meta.get("event_id").cloned(),
            buyer_name: meta.get("buyer_name").cloned(),
            buyer_email: session
                .customer_email
                .clone()
                .or_else(|| meta.get("buyer_email").cloned()),
            tier: meta.get("tier").cloned(),
            quantity: meta
                .get("quantity")
                .and_then(|q| q.parse().ok())
                .unwrap_or(1),
            amount_total: session.amount_total,
            referrer_model_id: meta.get("referrer_model_id").cloned(),
        }),

        Some("workshop_registration") => CheckoutIntent::WorkshopRegistration(WorkshopCheckout {
            session_id: session.id.clone(),
            workshop_id: meta.get("workshop_id").cloned(),
            attendee_name: meta.get("attendee_name").cloned(),
            attendee_email: session
                .customer_email
                .clone()
                .or_else(|| meta.get("attendee_email").cloned()),
            payment_plan: meta
                .get("payment_plan")
                .and_then(|p| PaymentPlan::from_str(p))
                .unwrap_or(PaymentPlan::Full),
            amount_total: session.amount_total,
            customer_id: session.customer.clone(),
        }),

        Some("content_program") => {
            let (Some(program_id), Some(user_id)) = (meta.get("program_id"), meta.get("user_id"))
            else {
                tracing::warn!(session = %session.id, "program checkout missing program_id/user_id");
                return Ok(WebhookEvent::Ignored("program checkout missing metadata"));
            };
            CheckoutIntent::ContentProgram {
                session_id: session.id.clone(),
                program_id: program_id.clone(),
                user_id: user_id.clone(),
            }
        }

        Some("comp_card_print") => {
            let Some(order_id) = meta.get("order_id") else {
                tracing::warn!(session = %session.id, "comp card checkout missing order_id");
                return Ok(WebhookEvent::Ignored("comp card checkout missing order_id"));
            };
            CheckoutIntent::CompCardPrint {
                order_id: order_id.clone(),
            }
        }

        Some("shop_order") => {
            let Some(order_id) = meta.get("order_id") else {
                tracing::warn!(session = %session.id, "shop checkout missing order_id");
                return Ok(WebhookEvent::Ignored("shop checkout missing order_id"));
            };
            CheckoutIntent::ShopOrder {
                order_id: order_id.clone(),
                payment_intent: session.payment_intent.clone(),
            }
        }

        Some(other) => {
            tracing::warn!(session = %session.id, kind = other, "unknown checkout metadata type");
            return Ok(WebhookEvent::Ignored("unknown checkout type"));
        }
    };

    Ok(WebhookEvent::CheckoutCompleted(intent))
}

fn decode_invoice_paid(event: &StripeEvent) -> Result<WebhookEvent> {
    let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadEvent(format!("invalid invoice: {}", e)))?;

    // Only renewal cycles grant coins here. The initial invoice
    // (subscription_create) is covered by checkout.session.completed;
    // treating it here too would double-grant.
    if invoice.billing_reason.as_deref() != Some("subscription_cycle") {
        return Ok(WebhookEvent::Ignored("invoice is not a renewal cycle"));
    }

    let Some(subscription_id) = invoice.subscription else {
        return Ok(WebhookEvent::Ignored("invoice has no subscription"));
    };

    Ok(WebhookEvent::SubscriptionRenewed(RenewalData {
        invoice_id: invoice.id,
        subscription_id,
    }))
}

fn decode_invoice_payment_failed(event: &StripeEvent) -> Result<WebhookEvent> {
    let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadEvent(format!("invalid invoice: {}", e)))?;

    match invoice.subscription {
        Some(subscription_id) => Ok(WebhookEvent::InvoicePaymentFailed { subscription_id }),
        None => Ok(WebhookEvent::Ignored("failed invoice has no subscription")),
    }
}

fn decode_subscription_updated(event: &StripeEvent) -> Result<WebhookEvent> {
    let subscription: StripeSubscriptionObject = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadEvent(format!("invalid subscription: {}", e)))?;
    Ok(WebhookEvent::SubscriptionUpdated(subscription))
}

fn decode_subscription_deleted(event: &StripeEvent) -> Result<WebhookEvent> {
    let subscription: StripeSubscriptionObject = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadEvent(format!("invalid subscription: {}", e)))?;
    Ok(WebhookEvent::SubscriptionDeleted {
        subscription_id: subscription.id,
    })
}

/// `payment_intent.*` events only matter for off-session installment
/// charges, which tag themselves via metadata. Everything else (shop orders,
/// checkouts) is already covered by session-level events.
fn decode_installment(event: &StripeEvent, succeeded: bool) -> Result<WebhookEvent> {
    let intent: StripePaymentIntent = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadEvent(format!("invalid payment intent: {}", e)))?;

    if intent.metadata.get("type").map(String::as_str) != Some("workshop_installment") {
        return Ok(WebhookEvent::Ignored("payment intent is not an installment charge"));
    }

    let (Some(registration_id), Some(number)) = (
        intent.metadata.get("registration_id"),
        intent.metadata.get("installment_number"),
    ) else {
        tracing::warn!(intent = %intent.id, "installment charge missing registration metadata");
        return Ok(WebhookEvent::Ignored("installment charge missing metadata"));
    };

    let Ok(installment_number) = number.parse::<i64>() else {
        tracing::warn!(intent = %intent.id, "installment charge has non-numeric installment_number");
        return Ok(WebhookEvent::Ignored("installment charge has bad installment_number"));
    };

    let charge = InstallmentCharge {
        registration_id: registration_id.clone(),
        installment_number,
    };
    Ok(if succeeded {
        WebhookEvent::InstallmentChargeSucceeded(charge)
    } else {
        WebhookEvent::InstallmentChargeFailed(charge)
    })
}
