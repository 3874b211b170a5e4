//! All SQL for the reconciliation core.
//!
//! Two disciplines hold everywhere in this file:
//!
//! - Coin balances and counters are mutated with atomic increments
//!   (`SET col = col + ?`), never read-modify-write. Concurrent webhook
//!   deliveries (retry + legitimate new event) can overlap.
//! - Financial effects go through `apply_coin_credit`, which inserts the
//!   ledger row and bumps the balance in one database transaction, keyed by
//!   a deterministic idempotency key. A UNIQUE-constraint hit on that key is
//!   the duplicate-delivery signal, not an error.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    query_all, query_one, AFFILIATE_EARNING_COLS, APPLICATION_COLS, COMMISSION_COLS,
    COMP_CARD_ORDER_COLS, ENROLLMENT_COLS, INSTALLMENT_COLS, LEDGER_COLS, MODEL_COLS,
    SHOP_ORDER_COLS, SHOP_ORDER_ITEM_COLS, SUBSCRIPTION_COLS, TICKET_PURCHASE_COLS, USER_COLS,
    WORKSHOP_REGISTRATION_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Seconds in a day, for installment due dates and affiliate holds.
const DAY_SECS: i64 = 86400;

/// Affiliate earnings are held for 14 days before becoming payable.
pub const AFFILIATE_HOLD_DAYS: i64 = 14;

// ============ Users ============

pub fn create_user(conn: &Connection, email: &str, name: &str) -> Result<User> {
    let id = gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO users (id, email, name, coin_balance, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![&id, email, name, created_at],
    )?;
    Ok(User {
        id,
        email: email.to_string(),
        name: name.to_string(),
        coin_balance: 0,
        created_at,
    })
}

pub fn count_users(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(Into::into)
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_coin_balance(conn: &Connection, user_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT coin_balance FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

// ============ Ledger (apply-effect-with-cause) ============

/// Credit coins to a user, exactly once per cause.
///
/// The ledger insert carries the idempotency key directly, so the insert and
/// the balance mutation land in one database transaction: either both happen
/// or neither does. `INSERT OR IGNORE` against the UNIQUE key turns a
/// duplicate delivery into a no-op instead of a constraint error.
pub fn apply_coin_credit(
    conn: &mut Connection,
    user_id: &str,
    amount: i64,
    action: LedgerAction,
    idempotency_key: &str,
    metadata: Option<&serde_json::Value>,
) -> Result<LedgerOutcome> {
    let tx = conn.transaction()?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO ledger_transactions
         (id, user_id, amount, action, metadata, idempotency_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            gen_id(),
            user_id,
            amount,
            action.as_str(),
            metadata.map(|m| m.to_string()),
            idempotency_key,
            now()
        ],
    )?;

    if inserted == 0 {
        // Already applied by an earlier delivery of the same event.
        return Ok(LedgerOutcome::Duplicate);
    }

    tx.execute(
        "UPDATE users SET coin_balance = coin_balance + ?1 WHERE id = ?2",
        params![amount, user_id],
    )?;

    tx.commit()?;
    Ok(LedgerOutcome::Applied)
}

pub fn get_ledger_by_key(
    conn: &Connection,
    idempotency_key: &str,
) -> Result<Option<LedgerTransaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM ledger_transactions WHERE idempotency_key = ?1",
            LEDGER_COLS
        ),
        &[&idempotency_key],
    )
}

pub fn count_ledger_for_user(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM ledger_transactions WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Subscription tiers ============

pub fn upsert_tier(conn: &Connection, tier: &str, monthly_coins: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO subscription_tiers (tier, monthly_coins) VALUES (?1, ?2)
         ON CONFLICT(tier) DO UPDATE SET monthly_coins = excluded.monthly_coins",
        params![tier, monthly_coins],
    )?;
    Ok(())
}

pub fn get_tier_monthly_coins(conn: &Connection, tier: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT monthly_coins FROM subscription_tiers WHERE tier = ?1",
        params![tier],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

// ============ Subscriptions ============

/// Activate (or re-activate) a user's subscription from a checkout event.
/// Upsert by user: a brand re-subscribing reuses its row.
pub fn activate_subscription(
    conn: &Connection,
    user_id: &str,
    tier: &str,
    billing_cycle: Option<&str>,
    stripe_subscription_id: &str,
    stripe_customer_id: Option<&str>,
) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO subscriptions
         (id, user_id, tier, status, stripe_subscription_id, stripe_customer_id,
          billing_cycle, verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6, 1, ?7, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
            tier = excluded.tier,
            status = 'active',
            stripe_subscription_id = excluded.stripe_subscription_id,
            stripe_customer_id = excluded.stripe_customer_id,
            billing_cycle = excluded.billing_cycle,
            verified = 1,
            updated_at = excluded.updated_at",
        params![
            gen_id(),
            user_id,
            tier,
            stripe_subscription_id,
            stripe_customer_id,
            billing_cycle,
            ts
        ],
    )?;
    Ok(())
}

/// Overwrite status/tier/period-end from the event's current snapshot.
/// Idempotent by nature - no guard needed.
pub fn overwrite_subscription_snapshot(
    conn: &Connection,
    stripe_subscription_id: &str,
    status: SubscriptionStatus,
    tier: Option<&str>,
    current_period_end: Option<i64>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET
            status = ?1,
            tier = COALESCE(?2, tier),
            current_period_end = COALESCE(?3, current_period_end),
            updated_at = ?4
         WHERE stripe_subscription_id = ?5",
        params![status.as_str(), tier, current_period_end, now(), stripe_subscription_id],
    )?;
    Ok(affected > 0)
}

/// Subscription deleted: pause and detach the provider id. The coin balance
/// is deliberately untouched - coins already granted are kept.
pub fn pause_subscription(conn: &Connection, stripe_subscription_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET
            status = 'paused',
            stripe_subscription_id = NULL,
            updated_at = ?1
         WHERE stripe_subscription_id = ?2",
        params![now(), stripe_subscription_id],
    )?;
    Ok(affected > 0)
}

pub fn mark_subscription_past_due(
    conn: &Connection,
    stripe_subscription_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'past_due', updated_at = ?1
         WHERE stripe_subscription_id = ?2",
        params![now(), stripe_subscription_id],
    )?;
    Ok(affected > 0)
}

pub fn stamp_coins_granted(conn: &Connection, stripe_subscription_id: &str) -> Result<bool> {
    let ts = now();
    let affected = conn.execute(
        "UPDATE subscriptions SET coins_granted_at = ?1, updated_at = ?1
         WHERE stripe_subscription_id = ?2",
        params![ts, stripe_subscription_id],
    )?;
    Ok(affected > 0)
}

pub fn get_subscription_by_user(conn: &Connection, user_id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

pub fn get_subscription_by_stripe_id(
    conn: &Connection,
    stripe_subscription_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&stripe_subscription_id],
    )
}

// ============ Models ============

pub fn create_model(
    conn: &Connection,
    user_id: &str,
    stage_name: &str,
    commission_rate: f64,
) -> Result<ReferrerModel> {
    let id = gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO models (id, user_id, stage_name, commission_rate, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, user_id, stage_name, commission_rate, created_at],
    )?;
    Ok(ReferrerModel {
        id,
        user_id: user_id.to_string(),
        stage_name: stage_name.to_string(),
        commission_rate,
        created_at,
    })
}

pub fn get_model_by_id(conn: &Connection, id: &str) -> Result<Option<ReferrerModel>> {
    query_one(
        conn,
        &format!("SELECT {} FROM models WHERE id = ?1", MODEL_COLS),
        &[&id],
    )
}

// ============ Ticket purchases ============

pub fn create_pending_ticket_purchase(
    conn: &Connection,
    input: &CreateTicketPurchase,
) -> Result<TicketPurchase> {
    let id = gen_id();
    let created_at = now();
    let quantity = input.quantity.max(1);
    let unit_price = input.total_cents / quantity;
    conn.execute(
        "INSERT INTO ticket_purchases
         (id, event_id, buyer_name, buyer_email, tier, quantity, unit_price_cents,
          total_cents, status, checkout_session_id, referrer_model_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?11)",
        params![
            &id,
            &input.event_id,
            &input.buyer_name,
            &input.buyer_email,
            &input.tier,
            quantity,
            unit_price,
            input.total_cents,
            &input.checkout_session_id,
            &input.referrer_model_id,
            created_at
        ],
    )?;
    fetch_ticket_purchase(conn, &id)
}

fn fetch_ticket_purchase(conn: &Connection, id: &str) -> Result<TicketPurchase> {
    get_ticket_purchase_by_id(conn, id)?
        .ok_or_else(|| crate::error::AppError::Internal("inserted ticket purchase not found".into()))
}

pub fn get_ticket_purchase_by_id(conn: &Connection, id: &str) -> Result<Option<TicketPurchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM ticket_purchases WHERE id = ?1",
            TICKET_PURCHASE_COLS
        ),
        &[&id],
    )
}

pub fn get_ticket_purchase_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<TicketPurchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM ticket_purchases WHERE checkout_session_id = ?1",
            TICKET_PURCHASE_COLS
        ),
        &[&session_id],
    )
}

/// Status-guarded pending -> completed transition. Returns the purchase and
/// whether this call performed the transition (false on webhook retry).
pub fn complete_ticket_purchase_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<(TicketPurchase, bool)>> {
    let updated: Option<TicketPurchase> = conn
        .query_row(
            &format!(
                "UPDATE ticket_purchases SET status = 'completed'
                 WHERE checkout_session_id = ?1 AND status = 'pending'
                 RETURNING {}",
                TICKET_PURCHASE_COLS
            ),
            params![session_id],
            crate::db::from_row::FromRow::from_row,
        )
        .optional()?;

    if let Some(p) = updated {
        return Ok(Some((p, true)));
    }
    // Not pending: either already completed (retry) or the row is missing
    // entirely (fallback path handled by the caller).
    Ok(get_ticket_purchase_by_session(conn, session_id)?.map(|p| (p, false)))
}

/// Fallback reconciliation: synthesize a completed purchase from event
/// metadata when the client-created pending row never appeared.
pub fn insert_completed_ticket_purchase(
    conn: &Connection,
    input: &CreateTicketPurchase,
) -> Result<TicketPurchase> {
    let id = gen_id();
    let created_at = now();
    let quantity = input.quantity.max(1);
    let unit_price = input.total_cents / quantity;
    conn.execute(
        "INSERT INTO ticket_purchases
         (id, event_id, buyer_name, buyer_email, tier, quantity, unit_price_cents,
          total_cents, status, checkout_session_id, referrer_model_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'completed', ?9, ?10, ?11)",
        params![
            &id,
            &input.event_id,
            &input.buyer_name,
            &input.buyer_email,
            &input.tier,
            quantity,
            unit_price,
            input.total_cents,
            &input.checkout_session_id,
            &input.referrer_model_id,
            created_at
        ],
    )?;
    fetch_ticket_purchase(conn, &id)
}

pub fn set_purchase_commission_id(
    conn: &Connection,
    purchase_id: &str,
    commission_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE ticket_purchases SET commission_id = ?1 WHERE id = ?2",
        params![commission_id, purchase_id],
    )?;
    Ok(affected > 0)
}

// ============ Commissions ============

/// Create the commission for a purchase, at most once. Returns None when a
/// commission for this purchase already exists (retry).
pub fn create_commission(
    conn: &Connection,
    model_id: &str,
    purchase_id: &str,
    sale_cents: i64,
    rate: f64,
    amount_cents: i64,
) -> Result<Option<Commission>> {
    let id = gen_id();
    let created_at = now();
    let inserted = conn.execute(
        "INSERT INTO commissions (id, model_id, purchase_id, sale_cents, rate, amount_cents, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(purchase_id) DO NOTHING",
        params![&id, model_id, purchase_id, sale_cents, rate, amount_cents, created_at],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    Ok(Some(Commission {
        id,
        model_id: model_id.to_string(),
        purchase_id: purchase_id.to_string(),
        sale_cents,
        rate,
        amount_cents,
        created_at,
    }))
}

pub fn get_commission_by_purchase(
    conn: &Connection,
    purchase_id: &str,
) -> Result<Option<Commission>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM commissions WHERE purchase_id = ?1",
            COMMISSION_COLS
        ),
        &[&purchase_id],
    )
}

// ============ Workshop registrations ============

pub fn create_pending_workshop_registration(
    conn: &Connection,
    input: &CreateWorkshopRegistration,
) -> Result<WorkshopRegistration> {
    insert_workshop_registration(conn, input, "pending")
}

fn insert_workshop_registration(
    conn: &Connection,
    input: &CreateWorkshopRegistration,
    status: &str,
) -> Result<WorkshopRegistration> {
    let id = gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO workshop_registrations
         (id, workshop_id, attendee_name, attendee_email, payment_plan, total_cents,
          status, checkout_session_id, stripe_customer_id, installments_paid, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
        params![
            &id,
            &input.workshop_id,
            &input.attendee_name,
            &input.attendee_email,
            input.payment_plan.as_str(),
            input.total_cents,
            status,
            &input.checkout_session_id,
            &input.stripe_customer_id,
            created_at
        ],
    )?;
    get_workshop_registration_by_id(conn, &id)?.ok_or_else(|| {
        crate::error::AppError::Internal("inserted workshop registration not found".into())
    })
}

pub fn get_workshop_registration_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<WorkshopRegistration>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM workshop_registrations WHERE id = ?1",
            WORKSHOP_REGISTRATION_COLS
        ),
        &[&id],
    )
}

pub fn get_workshop_registration_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<WorkshopRegistration>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM workshop_registrations WHERE checkout_session_id = ?1",
            WORKSHOP_REGISTRATION_COLS
        ),
        &[&session_id],
    )
}

/// Status-guarded pending -> completed transition, recording the Stripe
/// customer id for future off-session installment charges. Returns the
/// registration and whether this call performed the transition.
pub fn complete_workshop_registration_by_session(
    conn: &Connection,
    session_id: &str,
    stripe_customer_id: Option<&str>,
) -> Result<Option<(WorkshopRegistration, bool)>> {
    let updated: Option<WorkshopRegistration> = conn
        .query_row(
            &format!(
                "UPDATE workshop_registrations SET
                    status = 'completed',
                    stripe_customer_id = COALESCE(?1, stripe_customer_id)
                 WHERE checkout_session_id = ?2 AND status = 'pending'
                 RETURNING {}",
                WORKSHOP_REGISTRATION_COLS
            ),
            params![stripe_customer_id, session_id],
            crate::db::from_row::FromRow::from_row,
        )
        .optional()?;

    if let Some(r) = updated {
        return Ok(Some((r, true)));
    }
    Ok(get_workshop_registration_by_session(conn, session_id)?.map(|r| (r, false)))
}

/// Fallback reconciliation for a missing client-created registration.
pub fn insert_completed_workshop_registration(
    conn: &Connection,
    input: &CreateWorkshopRegistration,
) -> Result<WorkshopRegistration> {
    insert_workshop_registration(conn, input, "completed")
}

// ============ Installment schedules ============

/// Synthesize the 3-entry schedule for an installment-plan registration:
/// today (paid - it was charged synchronously at checkout), +30 days, +60
/// days. The first entry absorbs the division remainder so the entries sum
/// to the registration total. Called only on the first completion of a
/// registration, never on retry.
pub fn create_installment_schedule(
    conn: &mut Connection,
    registration_id: &str,
    total_cents: i64,
) -> Result<Vec<WorkshopInstallment>> {
    let per = total_cents / 3;
    let first = total_cents - 2 * per;
    let today = now();

    let tx = conn.transaction()?;
    for (number, amount, due, status) in [
        (1i64, first, today, "paid"),
        (2, per, today + 30 * DAY_SECS, "pending"),
        (3, per, today + 60 * DAY_SECS, "pending"),
    ] {
        tx.execute(
            "INSERT INTO workshop_installments
             (id, registration_id, installment_number, amount_cents, due_date, status, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![gen_id(), registration_id, number, amount, due, status],
        )?;
    }
    // Installment 1 counts as paid from the start.
    tx.execute(
        "UPDATE workshop_registrations SET installments_paid = 1 WHERE id = ?1",
        params![registration_id],
    )?;
    tx.commit()?;

    list_installments(conn, registration_id)
}

pub fn list_installments(
    conn: &Connection,
    registration_id: &str,
) -> Result<Vec<WorkshopInstallment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM workshop_installments WHERE registration_id = ?1
             ORDER BY installment_number",
            INSTALLMENT_COLS
        ),
        &[&registration_id],
    )
}

/// Mark a scheduled installment paid and bump the registration's paid count,
/// atomically. The pending-status guard makes a retried success event a
/// no-op. Returns whether the transition happened.
pub fn mark_installment_paid(
    conn: &mut Connection,
    registration_id: &str,
    installment_number: i64,
) -> Result<bool> {
    let tx = conn.transaction()?;
    let affected = tx.execute(
        "UPDATE workshop_installments SET status = 'paid'
         WHERE registration_id = ?1 AND installment_number = ?2 AND status = 'pending'",
        params![registration_id, installment_number],
    )?;
    if affected == 0 {
        return Ok(false);
    }
    tx.execute(
        "UPDATE workshop_registrations SET installments_paid = installments_paid + 1
         WHERE id = ?1",
        params![registration_id],
    )?;
    tx.commit()?;
    Ok(true)
}

/// A failed off-session charge only bumps the retry counter. No status flip,
/// no cancellation - that policy lives elsewhere.
pub fn bump_installment_retry(
    conn: &Connection,
    registration_id: &str,
    installment_number: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE workshop_installments SET retry_count = retry_count + 1
         WHERE registration_id = ?1 AND installment_number = ?2",
        params![registration_id, installment_number],
    )?;
    Ok(affected > 0)
}

// ============ Trip / creator-house applications ============

pub fn create_trip(conn: &Connection, title: &str, spots_total: i64) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO trips (id, title, spots_total, spots_filled, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![&id, title, spots_total, now()],
    )?;
    Ok(id)
}

pub fn get_trip_spots_filled(conn: &Connection, trip_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT spots_filled FROM trips WHERE id = ?1",
        params![trip_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn create_trip_application(
    conn: &Connection,
    user_id: &str,
    trip_id: &str,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO trip_applications
         (id, user_id, listing_id, payment_status, amount_paid_cents, approved, created_at)
         VALUES (?1, ?2, ?3, 'pending', 0, 0, ?4)",
        params![&id, user_id, trip_id, now()],
    )?;
    Ok(id)
}

pub fn get_trip_application(conn: &Connection, id: &str) -> Result<Option<Application>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM trip_applications WHERE id = ?1",
            APPLICATION_COLS
        ),
        &[&id],
    )
}

/// Trip payment: mark paid, record the amount, auto-approve, and atomically
/// bump the parent trip's spots_filled counter - all in one transaction,
/// guarded on the pending payment status so a retry changes nothing.
pub fn mark_trip_application_paid(
    conn: &mut Connection,
    application_id: &str,
    amount_cents: i64,
) -> Result<bool> {
    let tx = conn.transaction()?;
    let listing_id: Option<String> = tx
        .query_row(
            "UPDATE trip_applications SET
                payment_status = 'paid',
                amount_paid_cents = ?1,
                approved = 1
             WHERE id = ?2 AND payment_status = 'pending'
             RETURNING listing_id",
            params![amount_cents, application_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(listing_id) = listing_id else {
        return Ok(false);
    };
    tx.execute(
        "UPDATE trips SET spots_filled = spots_filled + 1 WHERE id = ?1",
        params![&listing_id],
    )?;
    tx.commit()?;
    Ok(true)
}

pub fn create_creator_house_application(
    conn: &Connection,
    user_id: &str,
    listing_id: &str,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO creator_house_applications
         (id, user_id, listing_id, payment_status, amount_paid_cents, approved, created_at)
         VALUES (?1, ?2, ?3, 'pending', 0, 0, ?4)",
        params![&id, user_id, listing_id, now()],
    )?;
    Ok(id)
}

pub fn get_creator_house_application(
    conn: &Connection,
    id: &str,
) -> Result<Option<Application>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM creator_house_applications WHERE id = ?1",
            APPLICATION_COLS
        ),
        &[&id],
    )
}

/// Creator-house payment: mark paid and record the amount. No approval or
/// capacity counter - that is trip-specific.
pub fn mark_creator_house_application_paid(
    conn: &Connection,
    application_id: &str,
    amount_cents: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE creator_house_applications SET
            payment_status = 'paid',
            amount_paid_cents = ?1
         WHERE id = ?2 AND payment_status = 'pending'",
        params![amount_cents, application_id],
    )?;
    Ok(affected > 0)
}

// ============ Shop ============

pub fn create_shop_product(conn: &Connection, name: &str, price_cents: i64) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO shop_products (id, name, price_cents, total_sold) VALUES (?1, ?2, ?3, 0)",
        params![&id, name, price_cents],
    )?;
    Ok(id)
}

pub fn get_product_total_sold(conn: &Connection, product_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT total_sold FROM shop_products WHERE id = ?1",
        params![product_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Atomic sold-counter bump. Never read-then-write: concurrent order
/// webhooks touching the same product would lose updates.
pub fn increment_product_total_sold(
    conn: &Connection,
    product_id: &str,
    quantity: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE shop_products SET total_sold = total_sold + ?1 WHERE id = ?2",
        params![quantity, product_id],
    )?;
    Ok(affected > 0)
}

pub struct CreateShopOrder {
    pub user_id: String,
    pub total_cents: i64,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub affiliate_code: Option<String>,
    pub commission_cents: i64,
}

pub fn create_shop_order(
    conn: &Connection,
    input: &CreateShopOrder,
    items: &[(String, i64, i64)], // (product_id, quantity, unit_price_cents)
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO shop_orders
         (id, user_id, status, total_cents, checkout_session_id, payment_intent_id,
          affiliate_code, commission_cents, created_at)
         VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &input.user_id,
            input.total_cents,
            &input.checkout_session_id,
            &input.payment_intent_id,
            &input.affiliate_code,
            input.commission_cents,
            now()
        ],
    )?;
    for (product_id, quantity, unit_price_cents) in items {
        conn.execute(
            "INSERT INTO shop_order_items (id, order_id, product_id, quantity, unit_price_cents, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
            params![gen_id(), &id, product_id, quantity, unit_price_cents],
        )?;
    }
    Ok(id)
}

pub fn get_shop_order(conn: &Connection, id: &str) -> Result<Option<ShopOrder>> {
    query_one(
        conn,
        &format!("SELECT {} FROM shop_orders WHERE id = ?1", SHOP_ORDER_COLS),
        &[&id],
    )
}

pub fn list_order_items(conn: &Connection, order_id: &str) -> Result<Vec<ShopOrderItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM shop_order_items WHERE order_id = ?1",
            SHOP_ORDER_ITEM_COLS
        ),
        &[&order_id],
    )
}

/// Status-guarded order payment: order and line items flip to paid together.
/// Returns the paid order and whether this call performed the transition.
pub fn mark_shop_order_paid(
    conn: &mut Connection,
    order_id: &str,
    charge_id: Option<&str>,
) -> Result<Option<(ShopOrder, bool)>> {
    let tx = conn.transaction()?;
    let updated: Option<ShopOrder> = tx
        .query_row(
            &format!(
                "UPDATE shop_orders SET status = 'paid', charge_id = COALESCE(?1, charge_id)
                 WHERE id = ?2 AND status = 'pending'
                 RETURNING {}",
                SHOP_ORDER_COLS
            ),
            params![charge_id, order_id],
            crate::db::from_row::FromRow::from_row,
        )
        .optional()?;

    let Some(order) = updated else {
        drop(tx);
        return Ok(get_shop_order(conn, order_id)?.map(|o| (o, false)));
    };

    tx.execute(
        "UPDATE shop_order_items SET status = 'paid' WHERE order_id = ?1",
        params![order_id],
    )?;
    tx.commit()?;
    Ok(Some((order, true)))
}

pub fn create_affiliate_code(conn: &Connection, code: &str, model_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO affiliate_codes (code, model_id, order_count, total_earnings_cents)
         VALUES (?1, ?2, 0, 0)",
        params![code, model_id],
    )?;
    Ok(())
}

pub fn get_affiliate_code(conn: &Connection, code: &str) -> Result<Option<AffiliateCode>> {
    conn.query_row(
        "SELECT code, model_id, order_count, total_earnings_cents FROM affiliate_codes WHERE code = ?1",
        params![code],
        |row| {
            Ok(AffiliateCode {
                code: row.get(0)?,
                model_id: row.get(1)?,
                order_count: row.get(2)?,
                total_earnings_cents: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Record an affiliate earning for a paid order, at most once per order
/// (UNIQUE on order_id). Earnings start pending with a 14-day hold, and the
/// code's aggregates are bumped atomically in the same transaction.
pub fn create_affiliate_earning(
    conn: &mut Connection,
    affiliate_code: &str,
    order_id: &str,
    amount_cents: i64,
) -> Result<Option<AffiliateEarning>> {
    let id = gen_id();
    let created_at = now();
    let available_at = created_at + AFFILIATE_HOLD_DAYS * DAY_SECS;

    let tx = conn.transaction()?;
    let inserted = tx.execute(
        "INSERT INTO affiliate_earnings
         (id, affiliate_code, order_id, amount_cents, status, available_at, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)
         ON CONFLICT(order_id) DO NOTHING",
        params![&id, affiliate_code, order_id, amount_cents, available_at, created_at],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    tx.execute(
        "UPDATE affiliate_codes SET
            order_count = order_count + 1,
            total_earnings_cents = total_earnings_cents + ?1
         WHERE code = ?2",
        params![amount_cents, affiliate_code],
    )?;
    tx.commit()?;

    Ok(Some(AffiliateEarning {
        id,
        affiliate_code: affiliate_code.to_string(),
        order_id: order_id.to_string(),
        amount_cents,
        status: "pending".to_string(),
        available_at,
        created_at,
    }))
}

pub fn get_earning_by_order(conn: &Connection, order_id: &str) -> Result<Option<AffiliateEarning>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM affiliate_earnings WHERE order_id = ?1",
            AFFILIATE_EARNING_COLS
        ),
        &[&order_id],
    )
}

pub fn add_cart_item(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
    quantity: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO cart_items (id, user_id, product_id, quantity) VALUES (?1, ?2, ?3, ?4)",
        params![gen_id(), user_id, product_id, quantity],
    )?;
    Ok(())
}

pub fn clear_cart(conn: &Connection, user_id: &str) -> Result<usize> {
    conn.execute("DELETE FROM cart_items WHERE user_id = ?1", params![user_id])
        .map_err(Into::into)
}

pub fn count_cart_items(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM cart_items WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Content-program enrollments ============

pub fn create_pending_enrollment(
    conn: &Connection,
    program_id: &str,
    user_id: &str,
    checkout_session_id: &str,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO program_enrollments
         (id, program_id, user_id, status, checkout_session_id, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
        params![&id, program_id, user_id, checkout_session_id, now()],
    )?;
    Ok(id)
}

pub fn get_enrollment_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<ProgramEnrollment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM program_enrollments WHERE checkout_session_id = ?1",
            ENROLLMENT_COLS
        ),
        &[&session_id],
    )
}

/// Update-by-session-id, falling back to insert when the client-created row
/// is missing. Same self-healing shape as tickets and workshops.
pub fn activate_enrollment_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<(ProgramEnrollment, bool)>> {
    let updated: Option<ProgramEnrollment> = conn
        .query_row(
            &format!(
                "UPDATE program_enrollments SET status = 'active'
                 WHERE checkout_session_id = ?1 AND status = 'pending'
                 RETURNING {}",
                ENROLLMENT_COLS
            ),
            params![session_id],
            crate::db::from_row::FromRow::from_row,
        )
        .optional()?;

    if let Some(e) = updated {
        return Ok(Some((e, true)));
    }
    Ok(get_enrollment_by_session(conn, session_id)?.map(|e| (e, false)))
}

pub fn insert_active_enrollment(
    conn: &Connection,
    program_id: &str,
    user_id: &str,
    checkout_session_id: &str,
) -> Result<ProgramEnrollment> {
    let id = gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO program_enrollments
         (id, program_id, user_id, status, checkout_session_id, created_at)
         VALUES (?1, ?2, ?3, 'active', ?4, ?5)",
        params![&id, program_id, user_id, checkout_session_id, created_at],
    )?;
    Ok(ProgramEnrollment {
        id,
        program_id: program_id.to_string(),
        user_id: user_id.to_string(),
        status: "active".to_string(),
        checkout_session_id: Some(checkout_session_id.to_string()),
        created_at,
    })
}

// ============ Comp-card print orders ============

pub fn create_comp_card_order(conn: &Connection, user_id: &str, total_cents: i64) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO comp_card_orders (id, user_id, status, total_cents, created_at)
         VALUES (?1, ?2, 'pending_payment', ?3, ?4)",
        params![&id, user_id, total_cents, now()],
    )?;
    Ok(id)
}

pub fn get_comp_card_order(conn: &Connection, id: &str) -> Result<Option<CompCardOrder>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM comp_card_orders WHERE id = ?1",
            COMP_CARD_ORDER_COLS
        ),
        &[&id],
    )
}

/// Paid only if currently pending_payment. The guard doubles as the
/// idempotency strategy: an already-paid order is a no-op.
pub fn mark_comp_card_order_paid(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE comp_card_orders SET status = 'paid'
         WHERE id = ?1 AND status = 'pending_payment'",
        params![order_id],
    )?;
    Ok(affected > 0)
}

// ============ Workshops (fixture/seed support) ============

pub fn create_workshop(conn: &Connection, title: &str, price_cents: i64) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO workshops (id, title, price_cents, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, title, price_cents, now()],
    )?;
    Ok(id)
}
