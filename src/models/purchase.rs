use serde::{Deserialize, Serialize};

/// Event ticket purchase. Usually created by the client as `pending` before
/// redirecting to checkout; the webhook handler completes it, or creates it
/// from event metadata when the client-side creation never happened
/// (fallback reconciliation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPurchase {
    pub id: String,
    pub event_id: String,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub tier: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub status: String,
    pub checkout_session_id: Option<String>,
    /// Referring model attached at checkout time, if any.
    pub referrer_model_id: Option<String>,
    /// Backfilled once the commission row is created.
    pub commission_id: Option<String>,
    pub created_at: i64,
}

/// Fields needed to synthesize a completed ticket purchase from webhook
/// metadata when no client-created row exists.
#[derive(Debug, Clone)]
pub struct CreateTicketPurchase {
    pub event_id: String,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub tier: Option<String>,
    pub quantity: i64,
    pub total_cents: i64,
    pub checkout_session_id: String,
    pub referrer_model_id: Option<String>,
}

/// Workshop registration, paid in full or via a 3-month installment plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkshopRegistration {
    pub id: String,
    pub workshop_id: String,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub payment_plan: PaymentPlan,
    pub total_cents: i64,
    pub status: String,
    pub checkout_session_id: Option<String>,
    /// Recorded for installment plans so the off-session job can charge
    /// future installments.
    pub stripe_customer_id: Option<String>,
    pub installments_paid: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateWorkshopRegistration {
    pub workshop_id: String,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub payment_plan: PaymentPlan,
    pub total_cents: i64,
    pub checkout_session_id: String,
    pub stripe_customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlan {
    Full,
    Installment3,
}

impl PaymentPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Installment3 => "installment_3",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "installment_3" => Some(Self::Installment3),
            _ => None,
        }
    }
}

/// One dated obligation in an installment schedule. Installment 1 is always
/// `paid` at creation since it was charged synchronously at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkshopInstallment {
    pub id: String,
    pub registration_id: String,
    pub installment_number: i64,
    pub amount_cents: i64,
    pub due_date: i64,
    pub status: String,
    /// Bumped when an off-session charge for this installment fails.
    /// Cancellation policy lives elsewhere; this handler only counts.
    pub retry_count: i64,
}

/// Trip or creator-house application with a payment attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub user_id: String,
    /// Parent listing (trip id or house id).
    pub listing_id: String,
    pub payment_status: String,
    pub amount_paid_cents: i64,
    pub approved: bool,
    pub created_at: i64,
}

/// Content-program enrollment, activated on payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEnrollment {
    pub id: String,
    pub program_id: String,
    pub user_id: String,
    pub status: String,
    pub checkout_session_id: Option<String>,
    pub created_at: i64,
}

/// Comp-card print order. The pending_payment -> paid transition is
/// status-guarded, which doubles as its idempotency strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompCardOrder {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub total_cents: i64,
    pub created_at: i64,
}
