use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::{BigDecimal, ToPrimitive};
use reqwest::Client;
use serde_json::{Value, json};

use super::processor::{
    InitializeRequest, InitializeResponse, PaymentProcessor, VerificationResponse, WebhookEvent,
    extract_reference, message_or, send_json, str_at, verify_hmac_sha512,
};
use crate::{
    core::app_error::AppError,
    enums::{GatewayName, PaymentStatus},
};

const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "USD", "GHS", "ZAR", "KES"];
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub struct PaystackProcessor {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackProcessor {
    pub fn new(client: Client, base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Paystack takes amounts in the lowest currency unit.
pub fn to_subunit(amount: &BigDecimal) -> Option<i64> {
    (amount * BigDecimal::from(100)).round(0).to_i64()
}

pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "success" => PaymentStatus::Completed,
        "failed" | "abandoned" | "reversed" => PaymentStatus::Abandoned,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentProcessor for PaystackProcessor {
    fn name(&self) -> GatewayName {
        GatewayName::Paystack
    }

    fn supports_currency(&self, currency: &str) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn initialize_payment(
        &self,
        request: InitializeRequest<'_>,
    ) -> Result<InitializeResponse, AppError> {
        let amount = to_subunit(request.amount)
            .ok_or_else(|| AppError::BadRequest("Amount is out of range".into()))?;

        let (status, body) = send_json(
            self.name(),
            self.client
                .post(format!("{}/transaction/initialize", self.base_url))
                .bearer_auth(&self.secret_key)
                .json(&json!({
                    "email": request.customer.email,
                    "amount": amount,
                    "currency": request.currency,
                    "reference": request.reference,
                    "callback_url": request.callback_url,
                })),
        )
        .await?;

        let accepted = status.is_success() && body.get("status") == Some(&Value::Bool(true));
        match (accepted, str_at(&body, "/data/authorization_url")) {
            (true, Some(url)) => Ok(InitializeResponse::success(
                message_or(&body, "Authorization URL created"),
                str_at(&body, "/data/reference")
                    .unwrap_or(request.reference)
                    .to_string(),
                url.to_string(),
            )),
            _ => Ok(InitializeResponse::error(message_or(
                &body,
                "Paystack rejected the payment",
            ))),
        }
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResponse, AppError> {
        let (status, body) = send_json(
            self.name(),
            self.client
                .get(format!("{}/transaction/verify/{}", self.base_url, reference))
                .bearer_auth(&self.secret_key),
        )
        .await?;

        if !status.is_success() {
            return Err(AppError::PaymentGateway(message_or(
                &body,
                "Paystack could not verify the payment",
            )));
        }

        Ok(VerificationResponse {
            status: map_status(str_at(&body, "/data/status").unwrap_or_default()),
            message: message_or(&body, "Verification successful"),
            reference: reference.to_string(),
        })
    }

    fn verify_webhook_signature(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        verify_hmac_sha512(headers, SIGNATURE_HEADER, &self.secret_key, body)
    }

    fn parse_webhook_event(&self, payload: &Value) -> Result<WebhookEvent, AppError> {
        let data = payload
            .get("data")
            .ok_or_else(|| AppError::BadRequest("Webhook payload has no data".into()))?;
        let reference = extract_reference(data)
            .ok_or_else(|| AppError::BadRequest("Webhook payload has no reference".into()))?;
        let event = str_at(payload, "/event").unwrap_or("unknown");
        let status = match event {
            "charge.success" => PaymentStatus::Completed,
            _ => map_status(str_at(data, "/status").unwrap_or_default()),
        };
        let event_id = match data.get("id") {
            Some(id) if !id.is_null() => format!("{event}:{id}"),
            _ => format!("{event}:{reference}"),
        };

        Ok(WebhookEvent {
            provider: self.name(),
            event_id,
            reference,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use axum::http::HeaderValue;

    use super::*;
    use crate::api::processor::sign_sha512;

    fn processor() -> PaystackProcessor {
        PaystackProcessor::new(Client::new(), "http://localhost", "sk_test_123")
    }

    #[test]
    fn converts_to_kobo() {
        assert_eq!(to_subunit(&BigDecimal::from_str("1500.50").unwrap()), Some(150_050));
        assert_eq!(to_subunit(&BigDecimal::from(20)), Some(2_000));
    }

    #[test]
    fn parses_charge_success() {
        let payload = serde_json::json!({
            "event": "charge.success",
            "data": {"id": 302961, "reference": "PAY-abc", "status": "success"}
        });
        let event = processor().parse_webhook_event(&payload).unwrap();
        assert_eq!(event.reference, "PAY-abc");
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.event_id, "charge.success:302961");
    }

    #[test]
    fn signature_uses_secret_key() {
        let body = br#"{"event":"charge.success"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign_sha512("sk_test_123", body)).unwrap(),
        );
        assert!(processor().verify_webhook_signature(&headers, body));
    }

    #[test]
    fn maps_provider_statuses() {
        assert_eq!(map_status("success"), PaymentStatus::Completed);
        assert_eq!(map_status("abandoned"), PaymentStatus::Abandoned);
        assert_eq!(map_status("ongoing"), PaymentStatus::Pending);
        assert!(processor().supports_currency("NGN"));
        assert!(!processor().supports_currency("EUR"));
    }
}
