use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::ToPrimitive;
use reqwest::Client;
use serde_json::{Value, json};

use super::processor::{
    InitializeRequest, InitializeResponse, PaymentProcessor, VerificationResponse, WebhookEvent,
    extract_reference, message_or, send_json, str_at, verify_shared_secret,
};
use crate::{
    core::app_error::AppError,
    enums::{GatewayName, PaymentStatus},
};

const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "USD", "EUR", "GBP", "GHS", "KES", "ZAR"];
pub const SIGNATURE_HEADER: &str = "verif-hash";

pub struct FlutterwaveProcessor {
    client: Client,
    base_url: String,
    secret_key: String,
    secret_hash: String,
}

impl FlutterwaveProcessor {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        secret_hash: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
            secret_hash: secret_hash.into(),
        }
    }
}

pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "successful" | "success" | "completed" => PaymentStatus::Completed,
        "failed" | "cancelled" => PaymentStatus::Abandoned,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentProcessor for FlutterwaveProcessor {
    fn name(&self) -> GatewayName {
        GatewayName::Flutterwave
    }

    fn supports_currency(&self, currency: &str) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn initialize_payment(
        &self,
        request: InitializeRequest<'_>,
    ) -> Result<InitializeResponse, AppError> {
        let amount = request
            .amount
            .to_f64()
            .ok_or_else(|| AppError::BadRequest("Amount is out of range".into()))?;

        let (status, body) = send_json(
            self.name(),
            self.client
                .post(format!("{}/payments", self.base_url))
                .bearer_auth(&self.secret_key)
                .json(&json!({
                    "tx_ref": request.reference,
                    "amount": amount,
                    "currency": request.currency,
                    "redirect_url": request.callback_url,
                    "customer": {
                        "email": request.customer.email,
                        "name": request.customer.name,
                    },
                })),
        )
        .await?;

        let accepted = status.is_success() && str_at(&body, "/status") == Some("success");
        match (accepted, str_at(&body, "/data/link")) {
            (true, Some(link)) => Ok(InitializeResponse::success(
                message_or(&body, "Hosted link created"),
                str_at(&body, "/data/reference")
                    .unwrap_or(request.reference)
                    .to_string(),
                link.to_string(),
            )),
            _ => Ok(InitializeResponse::error(message_or(
                &body,
                "Flutterwave rejected the payment",
            ))),
        }
    }

    async fn verify_payment(&self, reference: &str) -> Result<VerificationResponse, AppError> {
        let (status, body) = send_json(
            self.name(),
            self.client
                .get(format!("{}/transactions/verify_by_reference", self.base_url))
                .query(&[("tx_ref", reference)])
                .bearer_auth(&self.secret_key),
        )
        .await?;

        if !status.is_success() {
            return Err(AppError::PaymentGateway(message_or(
                &body,
                "Flutterwave could not verify the payment",
            )));
        }

        Ok(VerificationResponse {
            status: map_status(str_at(&body, "/data/status").unwrap_or_default()),
            message: message_or(&body, "Transaction fetched successfully"),
            reference: reference.to_string(),
        })
    }

    fn verify_webhook_signature(&self, headers: &HeaderMap, _body: &[u8]) -> bool {
        verify_shared_secret(headers, SIGNATURE_HEADER, &self.secret_hash)
    }

    fn parse_webhook_event(&self, payload: &Value) -> Result<WebhookEvent, AppError> {
        let data = payload
            .get("data")
            .ok_or_else(|| AppError::BadRequest("Webhook payload has no data".into()))?;
        let reference = extract_reference(data)
            .ok_or_else(|| AppError::BadRequest("Webhook payload has no reference".into()))?;
        let event = str_at(payload, "/event").unwrap_or("unknown");
        let event_id = match data.get("id") {
            Some(id) if !id.is_null() => format!("{event}:{id}"),
            _ => format!("{event}:{reference}"),
        };

        Ok(WebhookEvent {
            provider: self.name(),
            event_id,
            status: map_status(str_at(data, "/status").unwrap_or_default()),
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn processor() -> FlutterwaveProcessor {
        FlutterwaveProcessor::new(Client::new(), "http://localhost", "FLWSECK_TEST", "hash-1")
    }

    #[test]
    fn supports_currency() {
        let processor = processor();
        assert!(processor.supports_currency("NGN"));
        assert!(processor.supports_currency("USD"));
        assert!(processor.supports_currency("EUR"));
        assert!(!processor.supports_currency("CAD"));
    }

    #[test]
    fn parses_charge_completed() {
        let payload = serde_json::json!({
            "event": "charge.completed",
            "data": {"id": 285959875, "tx_ref": "PAY-xyz", "status": "successful"}
        });
        let event = processor().parse_webhook_event(&payload).unwrap();
        assert_eq!(event.reference, "PAY-xyz");
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.event_id, "charge.completed:285959875");
    }

    #[test]
    fn webhook_needs_matching_hash() {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("hash-1"));
        assert!(processor().verify_webhook_signature(&headers, b"{}"));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("hash-2"));
        assert!(!processor().verify_webhook_signature(&headers, b"{}"));
    }

    #[test]
    fn missing_data_is_a_bad_request() {
        let err = processor()
            .parse_webhook_event(&serde_json::json!({"event": "charge.completed"}))
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
