//! Shop order processing: order/line-item payment, sold counters,
//! affiliate earnings, and cart clearing.

use crate::db::{queries, AppState};
use crate::error::Result;

use super::Disposition;

/// Process a paid shop checkout.
///
/// The pending -> paid transition on the order is the gate: everything
/// downstream (counters, affiliate earning, cart clear) runs only when this
/// delivery performed the transition, so a retry re-runs none of it.
pub async fn process_shop_order(
    state: &AppState,
    order_id: &str,
    payment_intent: Option<&str>,
) -> Result<Disposition> {
    {
        let conn = state.db.get()?;
        let Some(order) = queries::get_shop_order(&conn, order_id)? else {
            tracing::warn!(order = order_id, "shop payment for unknown order");
            return Ok(Disposition::Ignored("unknown order"));
        };
        if order.status != "pending" {
            tracing::info!(order = order_id, "shop order already paid, skipping");
            return Ok(Disposition::Duplicate);
        }
    }

    // Resolve the charge id behind the payment intent for the order record.
    // Enrichment only: a lookup failure must not block reconciliation.
    let charge_id = match payment_intent {
        Some(pi) => match state.provider.fetch_charge_id(pi).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(order = order_id, "failed to resolve charge id: {}", e);
                None
            }
        },
        None => None,
    };

    let mut conn = state.db.get()?;
    let Some((order, first)) = queries::mark_shop_order_paid(&mut conn, order_id, charge_id.as_deref())?
    else {
        tracing::warn!(order = order_id, "shop order disappeared mid-processing");
        return Ok(Disposition::Ignored("unknown order"));
    };
    if !first {
        // Lost the race against a concurrent delivery.
        return Ok(Disposition::Duplicate);
    }

    for item in queries::list_order_items(&conn, order_id)? {
        queries::increment_product_total_sold(&conn, &item.product_id, item.quantity)?;
    }

    if let Some(code) = &order.affiliate_code {
        let amount_cents = affiliate_amount(&conn, code, order.total_cents, order.commission_cents)?;
        if amount_cents > 0 {
            if queries::create_affiliate_earning(&mut conn, code, order_id, amount_cents)?.is_some() {
                tracing::info!(order = order_id, code, amount_cents, "affiliate earning recorded");
            }
        }
    }

    let cleared = queries::clear_cart(&conn, &order.user_id)?;
    tracing::info!(
        order = order_id,
        total = order.total_cents,
        cart_items_cleared = cleared,
        "shop order paid"
    );
    Ok(Disposition::Applied)
}

/// Earning amount for an order: the figure locked in at checkout when
/// present, otherwise computed from the code's current commission rate.
fn affiliate_amount(
    conn: &rusqlite::Connection,
    code: &str,
    total_cents: i64,
    commission_cents: i64,
) -> Result<i64> {
    if commission_cents > 0 {
        return Ok(commission_cents);
    }
    let Some(affiliate) = queries::get_affiliate_code(conn, code)? else {
        tracing::warn!(code, "order references unknown affiliate code");
        return Ok(0);
    };
    let Some(model) = queries::get_model_by_id(conn, &affiliate.model_id)? else {
        return Ok(0);
    };
    Ok((total_cents as f64 * model.commission_rate).round() as i64)
}
