use serde::{Deserialize, Serialize};

/// One coin balance mutation. Insert-only: rows are never updated after
/// creation. The idempotency key is unique per logical cause, so a webhook
/// retry can never double-apply the same effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: String,
    /// Signed coin amount. Always a non-negative integer for credits; this
    /// system never debits through the webhook path.
    pub amount: i64,
    pub action: LedgerAction,
    /// Free-form JSON context (session id, invoice id, commission id, ...).
    pub metadata: Option<String>,
    /// Deterministic cause key, UNIQUE in the schema. The unique constraint
    /// is the duplicate-delivery signal: an insert that hits it means the
    /// effect was already applied.
    pub idempotency_key: String,
    pub created_at: i64,
}

/// Why a coin balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Purchase,
    SubscriptionGrant,
    SubscriptionRenewal,
    AffiliateCommission,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::SubscriptionGrant => "subscription_grant",
            Self::SubscriptionRenewal => "subscription_renewal",
            Self::AffiliateCommission => "affiliate_commission",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(Self::Purchase),
            "subscription_grant" => Some(Self::SubscriptionGrant),
            "subscription_renewal" => Some(Self::SubscriptionRenewal),
            "affiliate_commission" => Some(Self::AffiliateCommission),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of an apply-effect-with-cause ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// Effect applied: ledger row created and balance mutated.
    Applied,
    /// The cause key already exists - the effect was applied by an earlier
    /// delivery of the same event. No writes performed.
    Duplicate,
}
