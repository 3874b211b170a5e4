//! Subscription lifecycle processing: activation, renewal grants, payment
//! failures, snapshot updates, and cancellation.

use rusqlite::Connection;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{LedgerAction, LedgerOutcome, SubscriptionStatus};
use crate::payments::StripeSubscriptionObject;

use super::events::RenewalData;
use super::Disposition;

/// Activate a subscription from checkout and grant the tier's monthly coins.
pub fn process_subscription_checkout(
    conn: &mut Connection,
    session_id: &str,
    user_id: &str,
    tier: &str,
    billing_cycle: Option<&str>,
    subscription_id: &str,
    customer_id: Option<&str>,
) -> Result<Disposition> {
    if queries::get_user_by_id(conn, user_id)?.is_none() {
        tracing::warn!(user = user_id, "subscription checkout for unknown user");
        return Ok(Disposition::Ignored("unknown user"));
    }

    queries::activate_subscription(conn, user_id, tier, billing_cycle, subscription_id, customer_id)?;

    grant_tier_coins(
        conn,
        user_id,
        tier,
        subscription_id,
        LedgerAction::SubscriptionGrant,
        &format!("subscription_grant:{}", session_id),
    )
}

/// Grant the renewal coins for a paid cycle invoice.
///
/// Renewal invoices do not carry the subscription's metadata, so the
/// subscription is re-fetched from Stripe for the authoritative tier and
/// period end. The invoice id keys the grant: one credit per billing cycle
/// no matter how many times the event is delivered.
pub async fn process_renewal(state: &AppState, data: &RenewalData) -> Result<Disposition> {
    let remote = state.provider.fetch_subscription(&data.subscription_id).await?;

    let mut conn = state.db.get()?;

    let local = queries::get_subscription_by_stripe_id(&conn, &data.subscription_id)?;
    let (user_id, tier) = match &local {
        Some(sub) => {
            let tier = remote
                .metadata
                .get("tier")
                .cloned()
                .unwrap_or_else(|| sub.tier.clone());
            (sub.user_id.clone(), tier)
        }
        // No local row: self-heal from the subscription's own metadata.
        None => {
            let (Some(user_id), Some(tier)) =
                (remote.metadata.get("user_id"), remote.metadata.get("tier"))
            else {
                tracing::warn!(
                    subscription = %data.subscription_id,
                    "renewal for unknown subscription with no identifying metadata"
                );
                return Ok(Disposition::Ignored("unknown subscription"));
            };
            queries::activate_subscription(
                &conn,
                user_id,
                tier,
                None,
                &data.subscription_id,
                remote.customer.as_deref(),
            )?;
            (user_id.clone(), tier.clone())
        }
    };

    queries::overwrite_subscription_snapshot(
        &conn,
        &data.subscription_id,
        SubscriptionStatus::Active,
        Some(&tier),
        remote.current_period_end,
    )?;

    grant_tier_coins(
        &mut conn,
        &user_id,
        &tier,
        &data.subscription_id,
        LedgerAction::SubscriptionRenewal,
        &format!("subscription_renewal:{}", data.invoice_id),
    )
}

fn grant_tier_coins(
    conn: &mut Connection,
    user_id: &str,
    tier: &str,
    subscription_id: &str,
    action: LedgerAction,
    idempotency_key: &str,
) -> Result<Disposition> {
    let Some(coins) = queries::get_tier_monthly_coins(conn, tier)? else {
        tracing::warn!(tier, subscription = subscription_id, "no coin allotment configured for tier");
        return Ok(Disposition::Applied);
    };

    let metadata = serde_json::json!({ "tier": tier, "subscription_id": subscription_id });
    match queries::apply_coin_credit(conn, user_id, coins, action, idempotency_key, Some(&metadata))? {
        LedgerOutcome::Applied => {
            queries::stamp_coins_granted(conn, subscription_id)?;
            tracing::info!(user = user_id, tier, coins, subscription = subscription_id, "tier coins granted");
            Ok(Disposition::Applied)
        }
        LedgerOutcome::Duplicate => {
            tracing::info!(key = idempotency_key, "tier coins already granted, skipping");
            Ok(Disposition::Duplicate)
        }
    }
}

/// A failed renewal charge marks the subscription past due. Access policy
/// for past-due subscriptions lives elsewhere; nothing is revoked here.
pub fn process_invoice_payment_failed(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Disposition> {
    if queries::mark_subscription_past_due(conn, subscription_id)? {
        tracing::info!(subscription = subscription_id, "subscription marked past due");
        Ok(Disposition::Applied)
    } else {
        tracing::warn!(subscription = subscription_id, "payment failure for unknown subscription");
        Ok(Disposition::Ignored("unknown subscription"))
    }
}

/// Overwrite the local row with the event's current snapshot. Naturally
/// idempotent: replaying the same snapshot writes the same values.
pub fn process_subscription_updated(
    conn: &Connection,
    subscription: &StripeSubscriptionObject,
) -> Result<Disposition> {
    let status = match subscription.status.as_str() {
        "active" | "trialing" => SubscriptionStatus::Active,
        "past_due" | "unpaid" => SubscriptionStatus::PastDue,
        "canceled" | "incomplete_expired" => SubscriptionStatus::Paused,
        other => {
            tracing::warn!(subscription = %subscription.id, status = other, "unmapped subscription status");
            return Ok(Disposition::Ignored("unmapped subscription status"));
        }
    };

    let tier = subscription.metadata.get("tier").map(String::as_str);
    if queries::overwrite_subscription_snapshot(
        conn,
        &subscription.id,
        status,
        tier,
        subscription.current_period_end,
    )? {
        Ok(Disposition::Applied)
    } else {
        tracing::warn!(subscription = %subscription.id, "update for unknown subscription");
        Ok(Disposition::Ignored("unknown subscription"))
    }
}

/// Subscription deleted at Stripe: pause locally and detach the provider
/// id so a future re-subscribe gets a fresh link. Coins already granted
/// are kept - they were paid for.
pub fn process_subscription_deleted(conn: &Connection, subscription_id: &str) -> Result<Disposition> {
    if queries::pause_subscription(conn, subscription_id)? {
        tracing::info!(subscription = subscription_id, "subscription paused after deletion");
        Ok(Disposition::Applied)
    } else {
        tracing::warn!(subscription = subscription_id, "deletion for unknown subscription");
        Ok(Disposition::Ignored("unknown subscription"))
    }
}
