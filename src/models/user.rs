use serde::{Deserialize, Serialize};

/// Platform account (fan, brand, or model login). The coin balance is the
/// hot shared resource: it is only ever mutated through atomic increments
/// in `db::queries`, never read-modify-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub coin_balance: i64,
    pub created_at: i64,
}

/// Referring model attached to ticket purchases for commission payouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferrerModel {
    pub id: String,
    pub user_id: String,
    pub stage_name: String,
    /// Commission fraction, e.g. 0.10 for 10%.
    pub commission_rate: f64,
    pub created_at: i64,
}
