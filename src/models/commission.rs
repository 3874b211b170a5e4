use serde::{Deserialize, Serialize};

/// Commission earned by a referring model on a ticket sale.
///
/// At most one commission exists per originating purchase (UNIQUE on
/// purchase_id), and each commission has exactly one coin credit applied,
/// guarded by the ledger idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: String,
    pub model_id: String,
    pub purchase_id: String,
    pub sale_cents: i64,
    pub rate: f64,
    /// round(sale_cents * rate). Credited 1:1 as coins (1 coin = 1 cent).
    pub amount_cents: i64,
    pub created_at: i64,
}
