mod common;

use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use serde_json::json;

use bingo_wallet_backend::database::repository::{TransactionLedger, WalletStore};
use common::TestApp;

async fn funded_withdrawal(app: &TestApp, user_id: &str, funds: i64, amount: i64) -> String {
    app.wallets
        .credit_once(user_id, &BigDecimal::from(funds), &format!("SEED-{}", user_id))
        .await
        .unwrap();
    let (status, body) = app
        .post_json("/api/wallet/withdraw", json!({ "userId": user_id, "amount": amount }))
        .await;
    assert_eq!(status, StatusCode::OK, "withdraw failed: {}", body);
    body["transactionId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_pending_withdrawals_are_listed() {
    let app = TestApp::new();
    let first = funded_withdrawal(&app, "player-1", 100, 40).await;
    let second = funded_withdrawal(&app, "player-2", 100, 10).await;
    app.start_deposit("player-3", 20).await;

    let (status, body) = app.get("/api/admin/withdrawals").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let refs: Vec<&str> = body["withdrawals"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["tx_ref"].as_str().unwrap())
        .collect();
    assert!(refs.contains(&first.as_str()));
    assert!(refs.contains(&second.as_str()));

    let (_, body) = app.get("/api/admin/withdrawals?limit=1").await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_approve_completes_without_balance_change() {
    let app = TestApp::new();
    let tx_ref = funded_withdrawal(&app, "player-1", 100, 40).await;

    let uri = format!("/api/admin/withdrawals/{}/approve", tx_ref);
    let (status, body) = app.post_json(&uri, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(app.balance("player-1").await, BigDecimal::from(60));

    // Approving twice is a no-op.
    let (status, _) = app.post_json(&uri, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.balance("player-1").await, BigDecimal::from(60));

    let (status, body) = app
        .post_json(&format!("/api/admin/withdrawals/{}/reject", tx_ref), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
    assert_eq!(app.balance("player-1").await, BigDecimal::from(60));

    let (_, body) = app.get("/api/admin/withdrawals").await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_reject_refunds_exactly_once() {
    let app = TestApp::new();
    let tx_ref = funded_withdrawal(&app, "player-1", 100, 40).await;
    assert_eq!(app.balance("player-1").await, BigDecimal::from(60));

    let uri = format!("/api/admin/withdrawals/{}/reject", tx_ref);
    let (status, body) = app
        .post_json(&uri, json!({ "reason": "account name mismatch" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failure_reason"], "account name mismatch");
    assert_eq!(app.balance("player-1").await, BigDecimal::from(100));

    let (status, _) = app.post_json(&uri, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.balance("player-1").await, BigDecimal::from(100));

    let (status, _) = app
        .post_json(&format!("/api/admin/withdrawals/{}/approve", tx_ref), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_rejecting_uncovered_withdrawal_leaves_balance() {
    let app = TestApp::new();
    app.wallets
        .credit_once("player-1", &BigDecimal::from(50), "SEED-player-1")
        .await
        .unwrap();

    let (status, _) = app
        .post_json("/api/wallet/withdraw", json!({ "userId": "player-1", "amount": 100 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let tx_ref = app.ledger.list_by_user("player-1", 10).await.unwrap()[0]
        .tx_ref
        .clone();

    let uri = format!("/api/admin/withdrawals/{}/reject", tx_ref);
    for _ in 0..2 {
        let (status, body) = app.post_json(&uri, json!({ "reason": "duplicate request" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["failure_reason"], "insufficient funds");
        assert_eq!(app.balance("player-1").await, BigDecimal::from(50));
    }

    let (status, _) = app
        .post_json(&format!("/api/admin/withdrawals/{}/approve", tx_ref), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.balance("player-1").await, BigDecimal::from(50));
}

#[tokio::test]
async fn test_admin_actions_need_a_known_withdrawal() {
    let app = TestApp::new();

    let (status, _) = app
        .post_json("/api/admin/withdrawals/WTH-nope/approve", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let deposit = app.start_deposit("player-1", 20).await;
    let (status, _) = app
        .post_json(&format!("/api/admin/withdrawals/{}/approve", deposit), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
