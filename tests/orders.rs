//! One-off purchase tests: ticket completion and fallback synthesis,
//! referral commissions, workshop installment schedules, applications,
//! enrollments, and comp-card orders.

mod common;

use axum::http::StatusCode;
use common::*;

fn ticket_event(session_id: &str, extra_metadata: serde_json::Value) -> serde_json::Value {
    let mut metadata = serde_json::json!({ "type": "ticket_purchase" });
    for (k, v) in extra_metadata.as_object().unwrap() {
        metadata[k] = v.clone();
    }
    checkout_event(
        session_id,
        serde_json::json!({ "amount_total": 5000, "metadata": metadata }),
    )
}

#[tokio::test]
async fn pending_ticket_purchase_is_completed() {
    let state = setup_state();
    let conn = state.db.get().unwrap();
    let purchase = queries::create_pending_ticket_purchase(
        &conn,
        &CreateTicketPurchase {
            event_id: "event_1".into(),
            buyer_name: Some("Ada".into()),
            buyer_email: Some("ada@test.local".into()),
            tier: Some("vip".into()),
            quantity: 2,
            total_cents: 5000,
            checkout_session_id: "cs_ticket".into(),
            referrer_model_id: None,
        },
    )
    .unwrap();
    drop(conn);
    let app = test_app(state.clone());

    let evt = ticket_event("cs_ticket", serde_json::json!({}));
    let (status, ack) = post_webhook(&app, evt.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack["duplicate"].is_null());

    {
        let conn = state.db.get().unwrap();
        let row = queries::get_ticket_purchase_by_id(&conn, &purchase.id)
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "completed");
    }

    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);
}

#[tokio::test]
async fn missing_ticket_row_is_synthesized_from_metadata() {
    let state = setup_state();
    let app = test_app(state.clone());

    let (status, _) = post_webhook(
        &app,
        ticket_event(
            "cs_ghost",
            serde_json::json!({
                "event_id": "event_9",
                "buyer_name": "Grace",
                "tier": "ga",
                "quantity": "2"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let row = queries::get_ticket_purchase_by_session(&conn, "cs_ghost")
        .unwrap()
        .expect("row synthesized");
    assert_eq!(row.status, "completed");
    assert_eq!(row.event_id, "event_9");
    assert_eq!(row.quantity, 2);
    assert_eq!(row.total_cents, 5000);
    assert_eq!(row.unit_price_cents, 2500);
}

#[tokio::test]
async fn unreconcilable_ticket_is_acknowledged_without_writes() {
    let state = setup_state();
    let app = test_app(state.clone());

    // No pending row and no event_id metadata: nothing can be synthesized.
    let (status, ack) = post_webhook(&app, ticket_event("cs_void", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack["ignored"].is_string());

    let conn = state.db.get().unwrap();
    assert!(queries::get_ticket_purchase_by_session(&conn, "cs_void")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn referral_commission_credited_once_with_rounding() {
    let state = setup_state();
    let (model_user, model) = create_test_model(&state, 0.10);
    {
        let conn = state.db.get().unwrap();
        // 9999 * 0.10 = 999.9, rounds to 1000.
        queries::create_pending_ticket_purchase(
            &conn,
            &CreateTicketPurchase {
                event_id: "event_c".into(),
                buyer_name: None,
                buyer_email: None,
                tier: None,
                quantity: 1,
                total_cents: 9999,
                checkout_session_id: "cs_comm".into(),
                referrer_model_id: Some(model.id.clone()),
            },
        )
        .unwrap();
    }
    let app = test_app(state.clone());

    let evt = checkout_event(
        "cs_comm",
        serde_json::json!({ "amount_total": 9999, "metadata": { "type": "ticket_purchase" } }),
    );
    post_webhook(&app, evt.clone()).await;

    assert_eq!(coin_balance(&state, &model_user.id), 1000);
    {
        let conn = state.db.get().unwrap();
        let purchase = queries::get_ticket_purchase_by_session(&conn, "cs_comm")
            .unwrap()
            .unwrap();
        let commission = queries::get_commission_by_purchase(&conn, &purchase.id)
            .unwrap()
            .expect("commission exists");
        assert_eq!(commission.amount_cents, 1000);
        assert_eq!(commission.sale_cents, 9999);
        assert_eq!(purchase.commission_id.as_deref(), Some(commission.id.as_str()));
    }

    // Redelivery: one commission, one credit.
    post_webhook(&app, evt).await;
    assert_eq!(coin_balance(&state, &model_user.id), 1000);
    assert_eq!(ledger_count(&state, &model_user.id), 1);
}

fn workshop_event(session_id: &str, plan: &str) -> serde_json::Value {
    checkout_event(
        session_id,
        serde_json::json!({
            "amount_total": 45000,
            "customer": "cus_w",
            "metadata": {
                "type": "workshop_registration",
                "workshop_id": "ws_1",
                "attendee_name": "Lena",
                "payment_plan": plan
            }
        }),
    )
}

#[tokio::test]
async fn full_plan_workshop_completes_without_schedule() {
    let state = setup_state();
    let app = test_app(state.clone());

    post_webhook(&app, workshop_event("cs_ws_full", "full")).await;

    let conn = state.db.get().unwrap();
    let reg = queries::get_workshop_registration_by_session(&conn, "cs_ws_full")
        .unwrap()
        .expect("registration synthesized");
    assert_eq!(reg.status, "completed");
    assert_eq!(reg.payment_plan, PaymentPlan::Full);
    assert!(queries::list_installments(&conn, &reg.id).unwrap().is_empty());
}

#[tokio::test]
async fn pending_workshop_registration_is_completed_with_customer_id() {
    let state = setup_state();
    let reg_id = {
        let conn = state.db.get().unwrap();
        queries::create_pending_workshop_registration(
            &conn,
            &CreateWorkshopRegistration {
                workshop_id: "ws_1".into(),
                attendee_name: Some("Lena".into()),
                attendee_email: None,
                payment_plan: PaymentPlan::Full,
                total_cents: 45000,
                checkout_session_id: "cs_ws_pending".into(),
                stripe_customer_id: None,
            },
        )
        .unwrap()
        .id
    };
    let app = test_app(state.clone());

    post_webhook(&app, workshop_event("cs_ws_pending", "full")).await;

    let conn = state.db.get().unwrap();
    let reg = queries::get_workshop_registration_by_id(&conn, &reg_id)
        .unwrap()
        .unwrap();
    assert_eq!(reg.status, "completed");
    // The customer id from the session is recorded for off-session charges.
    assert_eq!(reg.stripe_customer_id.as_deref(), Some("cus_w"));
}

#[tokio::test]
async fn installment_plan_creates_three_entry_schedule() {
    let state = setup_state();
    let app = test_app(state.clone());

    let evt = workshop_event("cs_ws_inst", "installment_3");
    post_webhook(&app, evt.clone()).await;

    let reg_id = {
        let conn = state.db.get().unwrap();
        let reg = queries::get_workshop_registration_by_session(&conn, "cs_ws_inst")
            .unwrap()
            .unwrap();
        assert_eq!(reg.installments_paid, 1);

        let schedule = queries::list_installments(&conn, &reg.id).unwrap();
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[0].status, "paid");
        assert_eq!(schedule[1].status, "pending");
        assert_eq!(schedule[2].status, "pending");
        // Entries sum to the registration total.
        assert_eq!(schedule.iter().map(|i| i.amount_cents).sum::<i64>(), 45000);
        // Due roughly today, +30 days, +60 days.
        assert_eq!(schedule[1].due_date - schedule[0].due_date, 30 * 86400);
        assert_eq!(schedule[2].due_date - schedule[0].due_date, 60 * 86400);
        reg.id
    };

    // Redelivery must not create a second schedule.
    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);
    let conn = state.db.get().unwrap();
    assert_eq!(queries::list_installments(&conn, &reg_id).unwrap().len(), 3);
}

fn installment_intent(event_type: &str, registration_id: &str, number: &str) -> serde_json::Value {
    event(
        event_type,
        serde_json::json!({
            "id": "pi_inst",
            "metadata": {
                "type": "workshop_installment",
                "registration_id": registration_id,
                "installment_number": number
            }
        }),
    )
}

#[tokio::test]
async fn installment_charge_lifecycle() {
    let state = setup_state();
    let app = test_app(state.clone());

    post_webhook(&app, workshop_event("cs_ws_life", "installment_3")).await;
    let reg_id = {
        let conn = state.db.get().unwrap();
        queries::get_workshop_registration_by_session(&conn, "cs_ws_life")
            .unwrap()
            .unwrap()
            .id
    };

    // A failed charge only counts the attempt.
    post_webhook(&app, installment_intent("payment_intent.payment_failed", &reg_id, "2")).await;
    {
        let conn = state.db.get().unwrap();
        let schedule = queries::list_installments(&conn, &reg_id).unwrap();
        assert_eq!(schedule[1].retry_count, 1);
        assert_eq!(schedule[1].status, "pending");
    }

    // The retried charge succeeds.
    let evt = installment_intent("payment_intent.succeeded", &reg_id, "2");
    let (status, ack) = post_webhook(&app, evt.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack["duplicate"].is_null());
    {
        let conn = state.db.get().unwrap();
        let schedule = queries::list_installments(&conn, &reg_id).unwrap();
        assert_eq!(schedule[1].status, "paid");
        let reg = queries::get_workshop_registration_by_id(&conn, &reg_id)
            .unwrap()
            .unwrap();
        assert_eq!(reg.installments_paid, 2);
    }

    // Redelivered success: paid count unchanged.
    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);
    let conn = state.db.get().unwrap();
    let reg = queries::get_workshop_registration_by_id(&conn, &reg_id)
        .unwrap()
        .unwrap();
    assert_eq!(reg.installments_paid, 2);
}

#[tokio::test]
async fn trip_payment_approves_and_fills_one_spot() {
    let state = setup_state();
    let (trip_id, application_id) = {
        let conn = state.db.get().unwrap();
        let user = queries::create_user(&conn, "traveler@test.local", "Traveler").unwrap();
        let trip_id = queries::create_trip(&conn, "Milan Trip", 10).unwrap();
        let app_id = queries::create_trip_application(&conn, &user.id, &trip_id).unwrap();
        (trip_id, app_id)
    };
    let app = test_app(state.clone());

    let evt = checkout_event(
        "cs_trip",
        serde_json::json!({
            "amount_total": 120000,
            "metadata": { "type": "trip_application", "application_id": application_id }
        }),
    );
    post_webhook(&app, evt.clone()).await;

    {
        let conn = state.db.get().unwrap();
        let application = queries::get_trip_application(&conn, &application_id)
            .unwrap()
            .unwrap();
        assert_eq!(application.payment_status, "paid");
        assert_eq!(application.amount_paid_cents, 120000);
        assert!(application.approved);
        assert_eq!(queries::get_trip_spots_filled(&conn, &trip_id).unwrap(), Some(1));
    }

    // Redelivery: the spot is not filled twice.
    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);
    let conn = state.db.get().unwrap();
    assert_eq!(queries::get_trip_spots_filled(&conn, &trip_id).unwrap(), Some(1));
}

#[tokio::test]
async fn creator_house_payment_marks_paid_without_approval() {
    let state = setup_state();
    let application_id = {
        let conn = state.db.get().unwrap();
        let user = queries::create_user(&conn, "resident@test.local", "Resident").unwrap();
        queries::create_creator_house_application(&conn, &user.id, "house_1").unwrap()
    };
    let app = test_app(state.clone());

    post_webhook(
        &app,
        checkout_event(
            "cs_house",
            serde_json::json!({
                "amount_total": 80000,
                "metadata": { "type": "creator_house", "application_id": application_id }
            }),
        ),
    )
    .await;

    let conn = state.db.get().unwrap();
    let application = queries::get_creator_house_application(&conn, &application_id)
        .unwrap()
        .unwrap();
    assert_eq!(application.payment_status, "paid");
    assert_eq!(application.amount_paid_cents, 80000);
    assert!(!application.approved);
}

#[tokio::test]
async fn program_enrollment_activates_or_synthesizes() {
    let state = setup_state();
    let user = create_test_user(&state, "student@test.local");
    {
        let conn = state.db.get().unwrap();
        queries::create_pending_enrollment(&conn, "prog_1", &user.id, "cs_prog").unwrap();
    }
    let app = test_app(state.clone());

    let evt = checkout_event(
        "cs_prog",
        serde_json::json!({
            "metadata": { "type": "content_program", "program_id": "prog_1", "user_id": user.id }
        }),
    );
    post_webhook(&app, evt.clone()).await;
    {
        let conn = state.db.get().unwrap();
        let enrollment = queries::get_enrollment_by_session(&conn, "cs_prog")
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, "active");
    }
    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);

    // No client-created row: the enrollment is synthesized active.
    post_webhook(
        &app,
        checkout_event(
            "cs_prog_ghost",
            serde_json::json!({
                "metadata": { "type": "content_program", "program_id": "prog_2", "user_id": user.id }
            }),
        ),
    )
    .await;
    let conn = state.db.get().unwrap();
    let enrollment = queries::get_enrollment_by_session(&conn, "cs_prog_ghost")
        .unwrap()
        .expect("enrollment synthesized");
    assert_eq!(enrollment.status, "active");
    assert_eq!(enrollment.program_id, "prog_2");
}

#[tokio::test]
async fn comp_card_payment_is_status_guarded() {
    let state = setup_state();
    let order_id = {
        let conn = state.db.get().unwrap();
        let user = queries::create_user(&conn, "printer@test.local", "Printer").unwrap();
        queries::create_comp_card_order(&conn, &user.id, 3500).unwrap()
    };
    let app = test_app(state.clone());

    let evt = checkout_event(
        "cs_card",
        serde_json::json!({ "metadata": { "type": "comp_card_print", "order_id": order_id } }),
    );
    let (status, ack) = post_webhook(&app, evt.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack["duplicate"].is_null());
    {
        let conn = state.db.get().unwrap();
        let order = queries::get_comp_card_order(&conn, &order_id).unwrap().unwrap();
        assert_eq!(order.status, "paid");
    }

    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);
}
