//! The Stripe webhook endpoint: verify, decode, dispatch, acknowledge.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::payments::{self, StripeEvent};

use super::events::{self, CheckoutIntent, WebhookEvent};
use super::{coins, orders, shop, subscriptions, Disposition, WebhookAck};

fn extract_signature(headers: &HeaderMap) -> Result<&str> {
    headers
        .get("stripe-signature")
        .ok_or(AppError::MissingSignature)?
        .to_str()
        .map_err(|_| AppError::InvalidSignature)
}

/// Axum handler for Stripe webhooks.
///
/// The raw body is taken as `Bytes` because the signature covers the exact
/// bytes on the wire; re-serializing a parsed body would not verify.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = extract_signature(&headers)?;

    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or(AppError::MissingWebhookSecret)?;

    if !payments::verify_webhook_signature(secret, &body, signature)? {
        return Err(AppError::InvalidSignature);
    }

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadEvent(format!("invalid event payload: {}", e)))?;

    tracing::debug!(event = %event.id, event_type = %event.event_type, "stripe webhook received");

    let disposition = dispatch(&state, &event).await?;

    if let Disposition::Ignored(reason) = disposition {
        tracing::debug!(event = %event.id, reason, "stripe webhook ignored");
    }

    Ok(Json(disposition.into()))
}

async fn dispatch(state: &AppState, event: &StripeEvent) -> Result<Disposition> {
    match events::decode_event(event)? {
        WebhookEvent::CheckoutCompleted(intent) => dispatch_checkout(state, intent).await,
        WebhookEvent::SubscriptionRenewed(data) => {
            subscriptions::process_renewal(state, &data).await
        }
        WebhookEvent::InvoicePaymentFailed { subscription_id } => {
            let conn = state.db.get()?;
            subscriptions::process_invoice_payment_failed(&conn, &subscription_id)
        }
        WebhookEvent::SubscriptionUpdated(subscription) => {
            let conn = state.db.get()?;
            subscriptions::process_subscription_updated(&conn, &subscription)
        }
        WebhookEvent::SubscriptionDeleted { subscription_id } => {
            let conn = state.db.get()?;
            subscriptions::process_subscription_deleted(&conn, &subscription_id)
        }
        WebhookEvent::InstallmentChargeSucceeded(charge) => {
            let mut conn = state.db.get()?;
            orders::process_installment_succeeded(&mut conn, &charge)
        }
        WebhookEvent::InstallmentChargeFailed(charge) => {
            let conn = state.db.get()?;
            orders::process_installment_failed(&conn, &charge)
        }
        WebhookEvent::Ignored(reason) => Ok(Disposition::Ignored(reason)),
    }
}

async fn dispatch_checkout(state: &AppState, intent: CheckoutIntent) -> Result<Disposition> {
    match intent {
        CheckoutIntent::CoinPurchase {
            session_id,
            user_id,
            coins,
        } => {
            let mut conn = state.db.get()?;
            coins::process_coin_purchase(&mut conn, &user_id, coins, &session_id)
        }
        CheckoutIntent::Subscription {
            session_id,
            user_id,
            tier,
            billing_cycle,
            subscription_id,
            customer_id,
        } => {
            let mut conn = state.db.get()?;
            subscriptions::process_subscription_checkout(
                &mut conn,
                &session_id,
                &user_id,
                &tier,
                billing_cycle.as_deref(),
                &subscription_id,
                customer_id.as_deref(),
            )
        }
        CheckoutIntent::TripApplication {
            application_id,
            amount_cents,
        } => {
            let mut conn = state.db.get()?;
            orders::process_trip_application(&mut conn, &application_id, amount_cents)
        }
        CheckoutIntent::CreatorHouse {
            application_id,
            amount_cents,
        } => {
            let conn = state.db.get()?;
            orders::process_creator_house_application(&conn, &application_id, amount_cents)
        }
        CheckoutIntent::TicketPurchase(data) => {
            let mut conn = state.db.get()?;
            orders::process_ticket_purchase(&mut conn, &data)
        }
        CheckoutIntent::WorkshopRegistration(data) => {
            let mut conn = state.db.get()?;
            orders::process_workshop_registration(&mut conn, &data)
        }
        CheckoutIntent::ContentProgram {
            session_id,
            program_id,
            user_id,
        } => {
            let conn = state.db.get()?;
            orders::process_content_program(&conn, &session_id, &program_id, &user_id)
        }
        CheckoutIntent::CompCardPrint { order_id } => {
            let conn = state.db.get()?;
            orders::process_comp_card_order(&conn, &order_id)
        }
        CheckoutIntent::ShopOrder {
            order_id,
            payment_intent,
        } => shop::process_shop_order(state, &order_id, payment_intent.as_deref()).await,
    }
}
