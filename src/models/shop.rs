use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopProduct {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    /// Lifetime units sold. Mutated only via atomic increment - concurrent
    /// order webhooks would otherwise lose updates.
    pub total_sold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopOrder {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub total_cents: i64,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Charge id resolved from the payment intent after payment.
    pub charge_id: Option<String>,
    /// Affiliate code attached at checkout, if any.
    pub affiliate_code: Option<String>,
    pub commission_cents: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopOrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateCode {
    pub code: String,
    pub model_id: String,
    pub order_count: i64,
    pub total_earnings_cents: i64,
}

/// Affiliate earning created `pending` with a 14-day hold before payout
/// eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateEarning {
    pub id: String,
    pub affiliate_code: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub available_at: i64,
    pub created_at: i64,
}
