use serde::{Deserialize, Serialize};

/// Brand-side subscription. Status transitions driven by subscription
/// lifecycle webhooks are the authoritative signal for feature gating
/// elsewhere in the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub tier: String,
    pub status: SubscriptionStatus,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    /// "monthly" or "yearly".
    pub billing_cycle: Option<String>,
    pub current_period_end: Option<i64>,
    /// When the monthly coin allotment was last granted (renewal stamp).
    pub coins_granted_at: Option<i64>,
    pub verified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
