//! One-off purchase processing: tickets (with referral commissions),
//! workshop registrations (with installment schedules), trip and creator
//! house applications, content programs, and comp-card print orders.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{
    CreateTicketPurchase, CreateWorkshopRegistration, LedgerAction, PaymentPlan, TicketPurchase,
};

use super::events::{InstallmentCharge, TicketCheckout, WorkshopCheckout};
use super::Disposition;

// ============ Ticket purchases ============

/// Complete a ticket purchase, synthesizing the row from event metadata if
/// the client-created pending one never made it. The referral commission is
/// granted only on the first completion.
pub fn process_ticket_purchase(conn: &mut Connection, data: &TicketCheckout) -> Result<Disposition> {
    let (purchase, first) = match queries::complete_ticket_purchase_by_session(conn, &data.session_id)? {
        Some(result) => result,
        None => {
            let Some(event_id) = &data.event_id else {
                tracing::warn!(
                    session = %data.session_id,
                    "ticket purchase has no pending row and no event_id to synthesize one"
                );
                return Ok(Disposition::Ignored("unreconcilable ticket purchase"));
            };
            let purchase = queries::insert_completed_ticket_purchase(
                conn,
                &CreateTicketPurchase {
                    event_id: event_id.clone(),
                    buyer_name: data.buyer_name.clone(),
                    buyer_email: data.buyer_email.clone(),
                    tier: data.tier.clone(),
                    quantity: data.quantity,
                    total_cents: data.amount_total.unwrap_or(0),
                    checkout_session_id: data.session_id.clone(),
                    referrer_model_id: data.referrer_model_id.clone(),
                },
            )?;
            tracing::info!(session = %data.session_id, purchase = %purchase.id, "synthesized missing ticket purchase");
            (purchase, true)
        }
    };

    if !first {
        tracing::info!(session = %data.session_id, "ticket purchase already completed, skipping");
        return Ok(Disposition::Duplicate);
    }

    if let Some(model_id) = purchase.referrer_model_id.clone() {
        grant_referral_commission(conn, &purchase, &model_id)?;
    }

    tracing::info!(purchase = %purchase.id, total = purchase.total_cents, "ticket purchase completed");
    Ok(Disposition::Applied)
}

/// Create the referral commission and credit it to the model's account in
/// coins (1 coin = 1 cent). The UNIQUE constraint on the commission's
/// purchase makes this a no-op on retry; the ledger key backstops the
/// coin credit independently.
fn grant_referral_commission(
    conn: &mut Connection,
    purchase: &TicketPurchase,
    model_id: &str,
) -> Result<()> {
    let Some(model) = queries::get_model_by_id(conn, model_id)? else {
        tracing::warn!(purchase = %purchase.id, model = model_id, "referrer model not found, no commission");
        return Ok(());
    };

    let amount_cents = (purchase.total_cents as f64 * model.commission_rate).round() as i64;
    if amount_cents <= 0 {
        return Ok(());
    }

    let Some(commission) = queries::create_commission(
        conn,
        model_id,
        &purchase.id,
        purchase.total_cents,
        model.commission_rate,
        amount_cents,
    )?
    else {
        return Ok(());
    };

    queries::set_purchase_commission_id(conn, &purchase.id, &commission.id)?;

    let key = format!("commission:{}", purchase.id);
    let metadata = serde_json::json!({ "commission_id": commission.id, "purchase_id": purchase.id });
    queries::apply_coin_credit(
        conn,
        &model.user_id,
        amount_cents,
        LedgerAction::AffiliateCommission,
        &key,
        Some(&metadata),
    )?;

    tracing::info!(
        model = model_id,
        purchase = %purchase.id,
        amount_cents,
        "referral commission credited"
    );
    Ok(())
}

// ============ Workshop registrations ============

/// Complete a workshop registration, synthesizing the row if missing. For
/// installment-plan registrations, the first completion also creates the
/// 3-entry payment schedule.
pub fn process_workshop_registration(
    conn: &mut Connection,
    data: &WorkshopCheckout,
) -> Result<Disposition> {
    let (registration, first) = match queries::complete_workshop_registration_by_session(
        conn,
        &data.session_id,
        data.customer_id.as_deref(),
    )? {
        Some(result) => result,
        None => {
            let Some(workshop_id) = &data.workshop_id else {
                tracing::warn!(
                    session = %data.session_id,
                    "workshop registration has no pending row and no workshop_id to synthesize one"
                );
                return Ok(Disposition::Ignored("unreconcilable workshop registration"));
            };
            let registration = queries::insert_completed_workshop_registration(
                conn,
                &CreateWorkshopRegistration {
                    workshop_id: workshop_id.clone(),
                    attendee_name: data.attendee_name.clone(),
                    attendee_email: data.attendee_email.clone(),
                    payment_plan: data.payment_plan,
                    total_cents: data.amount_total.unwrap_or(0),
                    checkout_session_id: data.session_id.clone(),
                    stripe_customer_id: data.customer_id.clone(),
                },
            )?;
            tracing::info!(session = %data.session_id, registration = %registration.id, "synthesized missing workshop registration");
            (registration, true)
        }
    };

    if !first {
        tracing::info!(session = %data.session_id, "workshop registration already completed, skipping");
        return Ok(Disposition::Duplicate);
    }

    if registration.payment_plan == PaymentPlan::Installment3 {
        queries::create_installment_schedule(conn, &registration.id, registration.total_cents)?;
        tracing::info!(registration = %registration.id, "installment schedule created");
    }

    tracing::info!(registration = %registration.id, plan = ?registration.payment_plan, "workshop registration completed");
    Ok(Disposition::Applied)
}

/// A successful off-session installment charge.
pub fn process_installment_succeeded(
    conn: &mut Connection,
    charge: &InstallmentCharge,
) -> Result<Disposition> {
    if queries::mark_installment_paid(conn, &charge.registration_id, charge.installment_number)? {
        tracing::info!(
            registration = %charge.registration_id,
            number = charge.installment_number,
            "installment paid"
        );
        return Ok(Disposition::Applied);
    }

    // Not pending: already paid (retry) or the schedule entry never existed.
    let exists = queries::list_installments(conn, &charge.registration_id)?
        .iter()
        .any(|i| i.installment_number == charge.installment_number);
    if exists {
        Ok(Disposition::Duplicate)
    } else {
        tracing::warn!(
            registration = %charge.registration_id,
            number = charge.installment_number,
            "installment charge for unknown schedule entry"
        );
        Ok(Disposition::Ignored("unknown installment"))
    }
}

/// A failed off-session installment charge only counts the attempt. Dunning
/// policy (when to give up, whether to cancel the seat) is out of scope
/// here.
pub fn process_installment_failed(
    conn: &Connection,
    charge: &InstallmentCharge,
) -> Result<Disposition> {
    if queries::bump_installment_retry(conn, &charge.registration_id, charge.installment_number)? {
        tracing::warn!(
            registration = %charge.registration_id,
            number = charge.installment_number,
            "installment charge failed, retry recorded"
        );
        Ok(Disposition::Applied)
    } else {
        tracing::warn!(
            registration = %charge.registration_id,
            number = charge.installment_number,
            "failed installment charge for unknown schedule entry"
        );
        Ok(Disposition::Ignored("unknown installment"))
    }
}

// ============ Trip / creator-house applications ============

pub fn process_trip_application(
    conn: &mut Connection,
    application_id: &str,
    amount_cents: i64,
) -> Result<Disposition> {
    if queries::get_trip_application(conn, application_id)?.is_none() {
        tracing::warn!(application = application_id, "trip payment for unknown application");
        return Ok(Disposition::Ignored("unknown application"));
    }
    if queries::mark_trip_application_paid(conn, application_id, amount_cents)? {
        tracing::info!(application = application_id, amount_cents, "trip application paid and approved");
        Ok(Disposition::Applied)
    } else {
        Ok(Disposition::Duplicate)
    }
}

pub fn process_creator_house_application(
    conn: &Connection,
    application_id: &str,
    amount_cents: i64,
) -> Result<Disposition> {
    if queries::get_creator_house_application(conn, application_id)?.is_none() {
        tracing::warn!(application = application_id, "creator house payment for unknown application");
        return Ok(Disposition::Ignored("unknown application"));
    }
    if queries::mark_creator_house_application_paid(conn, application_id, amount_cents)? {
        tracing::info!(application = application_id, amount_cents, "creator house application paid");
        Ok(Disposition::Applied)
    } else {
        Ok(Disposition::Duplicate)
    }
}

// ============ Content-program enrollments ============

pub fn process_content_program(
    conn: &Connection,
    session_id: &str,
    program_id: &str,
    user_id: &str,
) -> Result<Disposition> {
    match queries::activate_enrollment_by_session(conn, session_id)? {
        Some((_, true)) => {
            tracing::info!(program = program_id, user = user_id, "program enrollment activated");
            Ok(Disposition::Applied)
        }
        Some((_, false)) => {
            tracing::info!(session = session_id, "program enrollment already active, skipping");
            Ok(Disposition::Duplicate)
        }
        None => {
            let enrollment =
                queries::insert_active_enrollment(conn, program_id, user_id, session_id)?;
            tracing::info!(
                enrollment = %enrollment.id,
                program = program_id,
                "synthesized missing program enrollment"
            );
            Ok(Disposition::Applied)
        }
    }
}

// ============ Comp-card print orders ============

pub fn process_comp_card_order(conn: &Connection, order_id: &str) -> Result<Disposition> {
    if queries::get_comp_card_order(conn, order_id)?.is_none() {
        tracing::warn!(order = order_id, "comp card payment for unknown order");
        return Ok(Disposition::Ignored("unknown order"));
    }
    if queries::mark_comp_card_order_paid(conn, order_id)? {
        tracing::info!(order = order_id, "comp card order paid");
        Ok(Disposition::Applied)
    } else {
        tracing::info!(order = order_id, "comp card order already past payment, skipping");
        Ok(Disposition::Duplicate)
    }
}
