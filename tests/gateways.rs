use std::{collections::HashMap, str::FromStr};

use axum::{
    Json, Router,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde_json::{Value, json};
use shopfront_service::{
    api::{
        flutterwave::FlutterwaveProcessor,
        paystack::PaystackProcessor,
        processor::{CustomerData, InitializeRequest, PaymentProcessor},
    },
    core::app_error::AppError,
    enums::PaymentStatus,
};

const SECRET_KEY: &str = "sk_test_stub";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {SECRET_KEY}").as_str())
}

/// Minimal stand-in for the Paystack and Flutterwave APIs.
fn stub() -> Router {
    Router::new()
        .route(
            "/paystack/transaction/initialize",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if !authorized(&headers) {
                    return (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"status": false, "message": "Invalid key"})),
                    );
                }
                assert_eq!(body["amount"], 250_050);
                (
                    StatusCode::OK,
                    Json(json!({
                        "status": true,
                        "message": "Authorization URL created",
                        "data": {
                            "authorization_url": "https://checkout.paystack.test/abc",
                            "reference": body["reference"],
                        }
                    })),
                )
            }),
        )
        .route(
            "/paystack/transaction/verify/{reference}",
            get(|Path(reference): Path<String>| async move {
                match reference.as_str() {
                    "PAY-OK" => (
                        StatusCode::OK,
                        Json(json!({"status": true, "message": "Verification successful", "data": {"status": "success"}})),
                    ),
                    "PAY-LATER" => (
                        StatusCode::OK,
                        Json(json!({"status": true, "message": "Verification successful", "data": {"status": "ongoing"}})),
                    ),
                    _ => (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"status": false, "message": "Transaction reference not found"})),
                    ),
                }
            }),
        )
        .route(
            "/flutterwave/payments",
            post(|Json(body): Json<Value>| async move {
                if body["currency"] == "XYZ" {
                    return Json(json!({"status": "error", "message": "Invalid currency"}));
                }
                Json(json!({
                    "status": "success",
                    "message": "Hosted Link",
                    "data": {"link": "https://checkout.flutterwave.test/pay/xyz"}
                }))
            }),
        )
        .route(
            "/flutterwave/transactions/verify_by_reference",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                let status = if query.get("tx_ref").map(String::as_str) == Some("PAY-OK") { "successful" } else { "failed" };
                Json(json!({"status": "success", "message": "Transaction fetched successfully", "data": {"status": status}}))
            }),
        )
}

async fn spawn_stub() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub()).await.unwrap();
    });
    format!("http://{addr}")
}

fn customer() -> CustomerData {
    CustomerData {
        email: "ada@example.com".into(),
        name: "ada".into(),
    }
}

#[tokio::test]
async fn paystack_initializes_with_subunit_amount() {
    let base = spawn_stub().await;
    let processor = PaystackProcessor::new(Client::new(), format!("{base}/paystack"), SECRET_KEY);
    let amount = BigDecimal::from_str("2500.50").unwrap();
    let customer = customer();

    let response = processor
        .initialize_payment(InitializeRequest {
            reference: "PAY-1",
            amount: &amount,
            currency: "NGN",
            customer: &customer,
            callback_url: "http://shop.test/payments/verify?provider=paystack",
        })
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.payment_id.as_deref(), Some("PAY-1"));
    assert_eq!(
        response.authorization_url.as_deref(),
        Some("https://checkout.paystack.test/abc")
    );
}

#[tokio::test]
async fn paystack_reports_rejection_without_erroring() {
    let base = spawn_stub().await;
    let processor = PaystackProcessor::new(Client::new(), format!("{base}/paystack"), "sk_wrong");
    let amount = BigDecimal::from(10);
    let customer = customer();

    let response = processor
        .initialize_payment(InitializeRequest {
            reference: "PAY-2",
            amount: &amount,
            currency: "NGN",
            customer: &customer,
            callback_url: "http://shop.test/payments/verify?provider=paystack",
        })
        .await
        .unwrap();

    assert!(!response.is_success());
    assert_eq!(response.message, "Invalid key");
}

#[tokio::test]
async fn paystack_verification_maps_statuses() {
    let base = spawn_stub().await;
    let processor = PaystackProcessor::new(Client::new(), format!("{base}/paystack"), SECRET_KEY);

    let done = processor.verify_payment("PAY-OK").await.unwrap();
    assert_eq!(done.status, PaymentStatus::Completed);
    assert_eq!(done.reference, "PAY-OK");

    let waiting = processor.verify_payment("PAY-LATER").await.unwrap();
    assert_eq!(waiting.status, PaymentStatus::Pending);

    let missing = processor.verify_payment("PAY-NOPE").await.unwrap_err();
    assert!(matches!(missing, AppError::PaymentGateway(message) if message == "Transaction reference not found"));
}

#[tokio::test]
async fn flutterwave_initialize_and_verify() {
    let base = spawn_stub().await;
    let processor = FlutterwaveProcessor::new(
        Client::new(),
        format!("{base}/flutterwave"),
        SECRET_KEY,
        "hash",
    );
    let amount = BigDecimal::from(75);
    let customer = customer();

    let response = processor
        .initialize_payment(InitializeRequest {
            reference: "PAY-OK",
            amount: &amount,
            currency: "USD",
            customer: &customer,
            callback_url: "http://shop.test/payments/verify?provider=flutterwave",
        })
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(
        response.authorization_url.as_deref(),
        Some("https://checkout.flutterwave.test/pay/xyz")
    );

    let rejected = processor
        .initialize_payment(InitializeRequest {
            reference: "PAY-X",
            amount: &amount,
            currency: "XYZ",
            customer: &customer,
            callback_url: "http://shop.test/payments/verify?provider=flutterwave",
        })
        .await
        .unwrap();
    assert!(!rejected.is_success());
    assert_eq!(rejected.message, "Invalid currency");

    let verified = processor.verify_payment("PAY-OK").await.unwrap();
    assert_eq!(verified.status, PaymentStatus::Completed);
    let failed = processor.verify_payment("PAY-BAD").await.unwrap();
    assert_eq!(failed.status, PaymentStatus::Abandoned);
}

#[tokio::test]
async fn unreachable_gateway_is_reported() {
    let processor = PaystackProcessor::new(Client::new(), "http://127.0.0.1:1", SECRET_KEY);
    let err = processor.verify_payment("PAY-1").await.unwrap_err();
    assert!(matches!(err, AppError::ServiceUnreachable(_)));
}
