//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T>(
    row: &Row,
    col: usize,
    col_name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, coin_balance, created_at";

pub const LEDGER_COLS: &str =
    "id, user_id, amount, action, metadata, idempotency_key, created_at";

pub const SUBSCRIPTION_COLS: &str = "id, user_id, tier, status, stripe_subscription_id, stripe_customer_id, billing_cycle, current_period_end, coins_granted_at, verified, created_at, updated_at";

pub const MODEL_COLS: &str = "id, user_id, stage_name, commission_rate, created_at";

pub const TICKET_PURCHASE_COLS: &str = "id, event_id, buyer_name, buyer_email, tier, quantity, unit_price_cents, total_cents, status, checkout_session_id, referrer_model_id, commission_id, created_at";

pub const COMMISSION_COLS: &str =
    "id, model_id, purchase_id, sale_cents, rate, amount_cents, created_at";

pub const WORKSHOP_REGISTRATION_COLS: &str = "id, workshop_id, attendee_name, attendee_email, payment_plan, total_cents, status, checkout_session_id, stripe_customer_id, installments_paid, created_at";

pub const INSTALLMENT_COLS: &str =
    "id, registration_id, installment_number, amount_cents, due_date, status, retry_count";

pub const APPLICATION_COLS: &str =
    "id, user_id, listing_id, payment_status, amount_paid_cents, approved, created_at";

pub const SHOP_ORDER_COLS: &str = "id, user_id, status, total_cents, checkout_session_id, payment_intent_id, charge_id, affiliate_code, commission_cents, created_at";

pub const SHOP_ORDER_ITEM_COLS: &str =
    "id, order_id, product_id, quantity, unit_price_cents, status";

pub const AFFILIATE_EARNING_COLS: &str =
    "id, affiliate_code, order_id, amount_cents, status, available_at, created_at";

pub const ENROLLMENT_COLS: &str =
    "id, program_id, user_id, status, checkout_session_id, created_at";

pub const COMP_CARD_ORDER_COLS: &str = "id, user_id, status, total_cents, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            coin_balance: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for LedgerTransaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LedgerTransaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            action: parse_enum(row, 3, "action", LedgerAction::from_str)?,
            metadata: row.get(4)?,
            idempotency_key: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            tier: row.get(2)?,
            status: parse_enum(row, 3, "status", SubscriptionStatus::from_str)?,
            stripe_subscription_id: row.get(4)?,
            stripe_customer_id: row.get(5)?,
            billing_cycle: row.get(6)?,
            current_period_end: row.get(7)?,
            coins_granted_at: row.get(8)?,
            verified: row.get::<_, i64>(9)? != 0,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for ReferrerModel {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ReferrerModel {
            id: row.get(0)?,
            user_id: row.get(1)?,
            stage_name: row.get(2)?,
            commission_rate: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for TicketPurchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TicketPurchase {
            id: row.get(0)?,
            event_id: row.get(1)?,
            buyer_name: row.get(2)?,
            buyer_email: row.get(3)?,
            tier: row.get(4)?,
            quantity: row.get(5)?,
            unit_price_cents: row.get(6)?,
            total_cents: row.get(7)?,
            status: row.get(8)?,
            checkout_session_id: row.get(9)?,
            referrer_model_id: row.get(10)?,
            commission_id: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

impl FromRow for Commission {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Commission {
            id: row.get(0)?,
            model_id: row.get(1)?,
            purchase_id: row.get(2)?,
            sale_cents: row.get(3)?,
            rate: row.get(4)?,
            amount_cents: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for WorkshopRegistration {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WorkshopRegistration {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            attendee_name: row.get(2)?,
            attendee_email: row.get(3)?,
            payment_plan: parse_enum(row, 4, "payment_plan", PaymentPlan::from_str)?,
            total_cents: row.get(5)?,
            status: row.get(6)?,
            checkout_session_id: row.get(7)?,
            stripe_customer_id: row.get(8)?,
            installments_paid: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for WorkshopInstallment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WorkshopInstallment {
            id: row.get(0)?,
            registration_id: row.get(1)?,
            installment_number: row.get(2)?,
            amount_cents: row.get(3)?,
            due_date: row.get(4)?,
            status: row.get(5)?,
            retry_count: row.get(6)?,
        })
    }
}

impl FromRow for Application {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Application {
            id: row.get(0)?,
            user_id: row.get(1)?,
            listing_id: row.get(2)?,
            payment_status: row.get(3)?,
            amount_paid_cents: row.get(4)?,
            approved: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for ShopOrder {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ShopOrder {
            id: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            total_cents: row.get(3)?,
            checkout_session_id: row.get(4)?,
            payment_intent_id: row.get(5)?,
            charge_id: row.get(6)?,
            affiliate_code: row.get(7)?,
            commission_cents: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for ShopOrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ShopOrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            product_id: row.get(2)?,
            quantity: row.get(3)?,
            unit_price_cents: row.get(4)?,
            status: row.get(5)?,
        })
    }
}

impl FromRow for AffiliateEarning {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AffiliateEarning {
            id: row.get(0)?,
            affiliate_code: row.get(1)?,
            order_id: row.get(2)?,
            amount_cents: row.get(3)?,
            status: row.get(4)?,
            available_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for ProgramEnrollment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProgramEnrollment {
            id: row.get(0)?,
            program_id: row.get(1)?,
            user_id: row.get(2)?,
            status: row.get(3)?,
            checkout_session_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for CompCardOrder {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CompCardOrder {
            id: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            total_cents: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
