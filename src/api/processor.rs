//! Common contract every payment gateway client implements.

use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use sha2::{Sha256, Sha512};
use utoipa::ToSchema;

use crate::{
    core::app_error::AppError,
    enums::{GatewayName, PaymentStatus},
};

#[derive(Debug, Clone)]
pub struct CustomerData {
    pub email: String,
    pub name: String,
}

/// Everything a provider needs to open a checkout session.
#[derive(Debug, Clone)]
pub struct InitializeRequest<'a> {
    pub reference: &'a str,
    pub amount: &'a BigDecimal,
    pub currency: &'a str,
    pub customer: &'a CustomerData,
    pub callback_url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InitializeResponse {
    /// `success` or `error`.
    pub status: String,
    pub message: String,
    /// Provider-side id for the transaction.
    pub payment_id: Option<String>,
    pub authorization_url: Option<String>,
}

impl InitializeResponse {
    pub fn success(message: impl Into<String>, payment_id: String, url: String) -> Self {
        Self {
            status: "success".into(),
            message: message.into(),
            payment_id: Some(payment_id),
            authorization_url: Some(url),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
            payment_id: None,
            authorization_url: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VerificationResponse {
    pub status: PaymentStatus,
    pub message: String,
    pub reference: String,
}

/// Provider webhook reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub provider: GatewayName,
    pub event_id: String,
    pub reference: String,
    pub status: PaymentStatus,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn name(&self) -> GatewayName;

    fn supports_currency(&self, currency: &str) -> bool;

    async fn initialize_payment(
        &self,
        request: InitializeRequest<'_>,
    ) -> Result<InitializeResponse, AppError>;

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResponse, AppError>;

    fn verify_webhook_signature(&self, headers: &HeaderMap, body: &[u8]) -> bool;

    fn parse_webhook_event(&self, payload: &Value) -> Result<WebhookEvent, AppError>;
}

/// Sends a request and reads the JSON body whatever the status code.
pub(crate) async fn send_json(
    provider: GatewayName,
    request: RequestBuilder,
) -> Result<(StatusCode, Value), AppError> {
    let response = request.send().await.map_err(|err| {
        tracing::warn!("{} request failed: {}", provider, err);
        AppError::ServiceUnreachable(provider.to_string())
    })?;
    let status = response.status();
    let body: Value = response.json().await.map_err(|err| {
        AppError::PaymentGateway(format!("{provider} returned an unreadable response: {err}"))
    })?;
    Ok((status, body))
}

pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn message_or(body: &Value, fallback: &str) -> String {
    str_at(body, "/message").unwrap_or(fallback).to_string()
}

/// Reference carried by a webhook `data` object: `tx_ref`, `reference` or `id`,
/// whichever is populated first.
pub fn extract_reference(data: &Value) -> Option<String> {
    ["tx_ref", "reference", "id"].iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Checks a hex HMAC-SHA512 header over the raw body.
pub(crate) fn verify_hmac_sha512(headers: &HeaderMap, name: &str, secret: &str, body: &[u8]) -> bool {
    let Some(expected) = header(headers, name).and_then(|sig| hex::decode(sig).ok()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Checks a hex HMAC-SHA256 header over the raw body.
pub(crate) fn verify_hmac_sha256(headers: &HeaderMap, name: &str, secret: &str, body: &[u8]) -> bool {
    let Some(expected) = header(headers, name).and_then(|sig| hex::decode(sig).ok()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compares a shared-secret header in constant time.
pub(crate) fn verify_shared_secret(headers: &HeaderMap, name: &str, secret: &str) -> bool {
    let Some(provided) = header(headers, name) else {
        return false;
    };
    if secret.is_empty() || provided.len() != secret.len() {
        return false;
    }
    provided
        .bytes()
        .zip(secret.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
pub(crate) fn sign_sha512(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
pub(crate) fn sign_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;

    #[test]
    fn reference_prefers_tx_ref_then_reference_then_id() {
        assert_eq!(
            extract_reference(&json!({"tx_ref": "a", "reference": "b", "id": 3})),
            Some("a".into())
        );
        assert_eq!(
            extract_reference(&json!({"tx_ref": "", "reference": "b"})),
            Some("b".into())
        );
        assert_eq!(extract_reference(&json!({"id": 42})), Some("42".into()));
        assert_eq!(extract_reference(&json!({"status": "ok"})), None);
    }

    #[test]
    fn hmac_signatures_must_match_body() {
        let body = br#"{"event":"charge.success"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-sig",
            HeaderValue::from_str(&sign_sha512("sk_test", body)).unwrap(),
        );
        assert!(verify_hmac_sha512(&headers, "x-sig", "sk_test", body));
        assert!(!verify_hmac_sha512(&headers, "x-sig", "sk_other", body));
        assert!(!verify_hmac_sha512(&headers, "x-sig", "sk_test", b"{}"));
        assert!(!verify_hmac_sha512(&HeaderMap::new(), "x-sig", "sk_test", body));
    }

    #[test]
    fn shared_secret_compares_exactly() {
        let mut headers = HeaderMap::new();
        headers.insert("verif-hash", HeaderValue::from_static("s3cret"));
        assert!(verify_shared_secret(&headers, "verif-hash", "s3cret"));
        assert!(!verify_shared_secret(&headers, "verif-hash", "s3creT"));
        assert!(!verify_shared_secret(&headers, "verif-hash", ""));
    }
}
