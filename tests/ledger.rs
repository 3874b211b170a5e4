//! Coin ledger tests: exactly-once credits across duplicate deliveries,
//! subscription grants and renewals, and lifecycle transitions.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::*;

fn coin_purchase(session_id: &str, user_id: &str, coins: &str) -> serde_json::Value {
    checkout_event(
        session_id,
        serde_json::json!({ "metadata": { "user_id": user_id, "coins": coins } }),
    )
}

#[tokio::test]
async fn coin_purchase_credits_balance_and_ledger() {
    let state = setup_state();
    let user = create_test_user(&state, "buyer@test.local");
    let app = test_app(state.clone());

    let (status, ack) = post_webhook(&app, coin_purchase("cs_1", &user.id, "500")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert!(ack["duplicate"].is_null());

    assert_eq!(coin_balance(&state, &user.id), 500);
    assert_eq!(ledger_count(&state, &user.id), 1);

    let conn = state.db.get().unwrap();
    let row = queries::get_ledger_by_key(&conn, "coin_purchase:cs_1")
        .unwrap()
        .expect("ledger row exists");
    assert_eq!(row.amount, 500);
    assert_eq!(row.action, LedgerAction::Purchase);
}

#[tokio::test]
async fn duplicate_delivery_credits_exactly_once() {
    let state = setup_state();
    let user = create_test_user(&state, "buyer@test.local");
    let app = test_app(state.clone());

    let evt = coin_purchase("cs_dup", &user.id, "300");
    let (status1, ack1) = post_webhook(&app, evt.clone()).await;
    let (status2, ack2) = post_webhook(&app, evt).await;

    assert_eq!(status1, StatusCode::OK);
    assert_eq!(status2, StatusCode::OK);
    assert!(ack1["duplicate"].is_null());
    assert_eq!(ack2["duplicate"], true);

    assert_eq!(coin_balance(&state, &user.id), 300);
    assert_eq!(ledger_count(&state, &user.id), 1);
}

#[tokio::test]
async fn distinct_sessions_credit_independently() {
    let state = setup_state();
    let user = create_test_user(&state, "buyer@test.local");
    let app = test_app(state.clone());

    post_webhook(&app, coin_purchase("cs_a", &user.id, "100")).await;
    post_webhook(&app, coin_purchase("cs_b", &user.id, "250")).await;

    assert_eq!(coin_balance(&state, &user.id), 350);
    assert_eq!(ledger_count(&state, &user.id), 2);
}

#[tokio::test]
async fn coin_purchase_for_unknown_user_returns_400() {
    let state = setup_state();
    let app = test_app(state);
    let (status, _) = post_webhook(&app, coin_purchase("cs_x", "missing-user", "100")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn subscription_checkout(session_id: &str, user_id: &str, tier: &str) -> serde_json::Value {
    checkout_event(
        session_id,
        serde_json::json!({
            "mode": "subscription",
            "subscription": "sub_test",
            "customer": "cus_test",
            "metadata": {
                "type": "subscription",
                "user_id": user_id,
                "tier": tier,
                "billing_cycle": "monthly"
            }
        }),
    )
}

#[tokio::test]
async fn subscription_checkout_activates_and_grants_once() {
    let state = setup_state();
    seed_tier(&state, "starter", 500);
    let user = create_test_user(&state, "brand@test.local");
    let app = test_app(state.clone());

    let evt = subscription_checkout("cs_sub", &user.id, "starter");
    let (status, _) = post_webhook(&app, evt.clone()).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(coin_balance(&state, &user.id), 500);
    {
        let conn = state.db.get().unwrap();
        let sub = queries::get_subscription_by_user(&conn, &user.id)
            .unwrap()
            .expect("subscription exists");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.tier, "starter");
        assert_eq!(sub.stripe_subscription_id.as_deref(), Some("sub_test"));
        assert!(sub.verified);
        assert!(sub.coins_granted_at.is_some());
    }

    // Redelivery: no second grant.
    let (_, ack) = post_webhook(&app, evt).await;
    assert_eq!(ack["duplicate"], true);
    assert_eq!(coin_balance(&state, &user.id), 500);
}

fn cycle_invoice(invoice_id: &str, subscription_id: &str) -> serde_json::Value {
    event(
        "invoice.paid",
        serde_json::json!({
            "id": invoice_id,
            "billing_reason": "subscription_cycle",
            "subscription": subscription_id,
            "status": "paid"
        }),
    )
}

#[tokio::test]
async fn renewal_invoice_grants_per_cycle() {
    let provider = Arc::new(FakeProvider::default().with_subscription(
        "sub_r",
        "active",
        serde_json::json!({ "tier": "starter" }),
        Some(1_900_000_000),
    ));
    let state = setup_state_with_provider(provider);
    seed_tier(&state, "starter", 500);
    let user = create_test_user(&state, "brand@test.local");
    let app = test_app(state.clone());

    // Establish the subscription via checkout first.
    let mut checkout = subscription_checkout("cs_sub_r", &user.id, "starter");
    checkout["data"]["object"]["subscription"] = serde_json::json!("sub_r");
    post_webhook(&app, checkout).await;
    assert_eq!(coin_balance(&state, &user.id), 500);

    // First renewal cycle.
    let (status, ack) = post_webhook(&app, cycle_invoice("in_1", "sub_r")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack["duplicate"].is_null());
    assert_eq!(coin_balance(&state, &user.id), 1000);

    // Same invoice redelivered: no grant.
    let (_, ack) = post_webhook(&app, cycle_invoice("in_1", "sub_r")).await;
    assert_eq!(ack["duplicate"], true);
    assert_eq!(coin_balance(&state, &user.id), 1000);

    // Next month's invoice: grants again.
    post_webhook(&app, cycle_invoice("in_2", "sub_r")).await;
    assert_eq!(coin_balance(&state, &user.id), 1500);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_user(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(sub.current_period_end, Some(1_900_000_000));
}

#[tokio::test]
async fn initial_invoice_does_not_double_grant() {
    let state = setup_state();
    seed_tier(&state, "starter", 500);
    let user = create_test_user(&state, "brand@test.local");
    let app = test_app(state.clone());

    post_webhook(&app, subscription_checkout("cs_sub_i", &user.id, "starter")).await;

    let (status, ack) = post_webhook(
        &app,
        event(
            "invoice.paid",
            serde_json::json!({
                "id": "in_initial",
                "billing_reason": "subscription_create",
                "subscription": "sub_test"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack["ignored"].is_string());
    assert_eq!(coin_balance(&state, &user.id), 500);
}

#[tokio::test]
async fn failed_invoice_marks_past_due() {
    let state = setup_state();
    seed_tier(&state, "starter", 500);
    let user = create_test_user(&state, "brand@test.local");
    let app = test_app(state.clone());

    post_webhook(&app, subscription_checkout("cs_sub_f", &user.id, "starter")).await;
    post_webhook(
        &app,
        event(
            "invoice.payment_failed",
            serde_json::json!({ "id": "in_f", "subscription": "sub_test" }),
        ),
    )
    .await;

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_user(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);
}

#[tokio::test]
async fn deleted_subscription_pauses_and_keeps_coins() {
    let state = setup_state();
    seed_tier(&state, "pro", 2000);
    let user = create_test_user(&state, "brand@test.local");
    let app = test_app(state.clone());

    post_webhook(&app, subscription_checkout("cs_sub_d", &user.id, "pro")).await;
    assert_eq!(coin_balance(&state, &user.id), 2000);

    let (status, _) = post_webhook(
        &app,
        event(
            "customer.subscription.deleted",
            serde_json::json!({ "id": "sub_test", "status": "canceled" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_user(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Paused);
    assert!(sub.stripe_subscription_id.is_none());
    // Release the pooled connection (pool size is 1) before coin_balance
    // acquires its own.
    drop(conn);
    // Coins already granted stay granted.
    assert_eq!(coin_balance(&state, &user.id), 2000);
}

#[tokio::test]
async fn subscription_update_overwrites_snapshot() {
    let state = setup_state();
    seed_tier(&state, "starter", 500);
    let user = create_test_user(&state, "brand@test.local");
    let app = test_app(state.clone());

    post_webhook(&app, subscription_checkout("cs_sub_u", &user.id, "starter")).await;

    let (status, _) = post_webhook(
        &app,
        event(
            "customer.subscription.updated",
            serde_json::json!({
                "id": "sub_test",
                "status": "past_due",
                "current_period_end": 1_800_000_000,
                "metadata": { "tier": "starter" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_user(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);
    assert_eq!(sub.current_period_end, Some(1_800_000_000));
}

#[tokio::test]
async fn renewal_with_provider_outage_returns_500() {
    // Empty fake provider: the re-fetch fails.
    let state = setup_state();
    let app = test_app(state);

    let (status, _) = post_webhook(&app, cycle_invoice("in_x", "sub_missing")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
