//! Coin top-up processing.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{LedgerAction, LedgerOutcome};

use super::Disposition;

/// Credit a coin purchase from a completed checkout session.
///
/// This is the strict path: the buyer's card has been charged, so any
/// failure to credit is a real financial discrepancy. Unknown users are a
/// 400 (Stripe retries while the data problem is investigated) rather than
/// a silently acknowledged no-op.
pub fn process_coin_purchase(
    conn: &mut Connection,
    user_id: &str,
    coins: i64,
    session_id: &str,
) -> Result<Disposition> {
    if queries::get_user_by_id(conn, user_id)?.is_none() {
        return Err(AppError::BadEvent(format!(
            "coin purchase for unknown user {}",
            user_id
        )));
    }

    let key = format!("coin_purchase:{}", session_id);
    let metadata = serde_json::json!({ "checkout_session_id": session_id });

    match queries::apply_coin_credit(
        conn,
        user_id,
        coins,
        LedgerAction::Purchase,
        &key,
        Some(&metadata),
    )? {
        LedgerOutcome::Applied => {
            tracing::info!(user = user_id, coins, session = session_id, "coin purchase credited");
            Ok(Disposition::Applied)
        }
        LedgerOutcome::Duplicate => {
            tracing::info!(session = session_id, "coin purchase already credited, skipping");
            Ok(Disposition::Duplicate)
        }
    }
}
