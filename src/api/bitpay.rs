use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::ToPrimitive;
use reqwest::Client;
use serde_json::{Value, json};

use super::processor::{
    InitializeRequest, InitializeResponse, PaymentProcessor, VerificationResponse, WebhookEvent,
    extract_reference, message_or, send_json, str_at, verify_hmac_sha256,
};
use crate::{
    core::app_error::AppError,
    enums::{GatewayName, PaymentStatus},
};

const SUPPORTED_CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "NGN", "BTC"];
pub const SIGNATURE_HEADER: &str = "x-signature";

pub struct BitPayProcessor {
    client: Client,
    base_url: String,
    api_token: String,
    webhook_secret: String,
}

impl BitPayProcessor {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_token: api_token.into(),
            webhook_secret: webhook_secret.into(),
        }
    }
}

pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "confirmed" | "complete" => PaymentStatus::Completed,
        "expired" | "invalid" | "declined" => PaymentStatus::Abandoned,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentProcessor for BitPayProcessor {
    fn name(&self) -> GatewayName {
        GatewayName::Bitpay
    }

    fn supports_currency(&self, currency: &str) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn initialize_payment(
        &self,
        request: InitializeRequest<'_>,
    ) -> Result<InitializeResponse, AppError> {
        let price = request
            .amount
            .to_f64()
            .ok_or_else(|| AppError::BadRequest("Amount is out of range".into()))?;

        let (status, body) = send_json(
            self.name(),
            self.client
                .post(format!("{}/invoices", self.base_url))
                .header("X-Accept-Version", "2.0.0")
                .json(&json!({
                    "token": self.api_token,
                    "price": price,
                    "currency": request.currency,
                    "orderId": request.reference,
                    "redirectURL": request.callback_url,
                    "buyer": {
                        "email": request.customer.email,
                        "name": request.customer.name,
                    },
                })),
        )
        .await?;

        match (
            status.is_success(),
            str_at(&body, "/data/id"),
            str_at(&body, "/data/url"),
        ) {
            (true, Some(id), Some(url)) => Ok(InitializeResponse::success(
                "Invoice created",
                id.to_string(),
                url.to_string(),
            )),
            _ => Ok(InitializeResponse::error(
                str_at(&body, "/error")
                    .map(str::to_string)
                    .unwrap_or_else(|| message_or(&body, "BitPay rejected the invoice")),
            )),
        }
    }

    /// `reference` is the BitPay invoice id returned by `initialize_payment`.
    async fn verify_payment(&self, reference: &str) -> Result<VerificationResponse, AppError> {
        let (status, body) = send_json(
            self.name(),
            self.client
                .get(format!("{}/invoices/{}", self.base_url, reference))
                .query(&[("token", self.api_token.as_str())])
                .header("X-Accept-Version", "2.0.0"),
        )
        .await?;

        if !status.is_success() {
            return Err(AppError::PaymentGateway(
                str_at(&body, "/error")
                    .unwrap_or("BitPay could not find the invoice")
                    .to_string(),
            ));
        }

        let invoice_status = str_at(&body, "/data/status").unwrap_or_default();
        Ok(VerificationResponse {
            status: map_status(invoice_status),
            message: format!("Invoice is {invoice_status}"),
            reference: str_at(&body, "/data/orderId")
                .unwrap_or(reference)
                .to_string(),
        })
    }

    fn verify_webhook_signature(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        verify_hmac_sha256(headers, SIGNATURE_HEADER, &self.webhook_secret, body)
    }

    fn parse_webhook_event(&self, payload: &Value) -> Result<WebhookEvent, AppError> {
        let data = payload
            .get("data")
            .ok_or_else(|| AppError::BadRequest("Webhook payload has no data".into()))?;
        let reference = str_at(data, "/orderId")
            .map(str::to_string)
            .or_else(|| extract_reference(data))
            .ok_or_else(|| AppError::BadRequest("Webhook payload has no reference".into()))?;
        let event = str_at(payload, "/event/name").unwrap_or("unknown");
        let invoice_id = str_at(data, "/id").unwrap_or(&reference);
        let status = match event {
            "invoice_completed" | "invoice_confirmed" => PaymentStatus::Completed,
            _ => map_status(str_at(data, "/status").unwrap_or_default()),
        };

        Ok(WebhookEvent {
            provider: self.name(),
            event_id: format!("{event}:{invoice_id}"),
            reference,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::api::processor::sign_sha256;

    fn processor() -> BitPayProcessor {
        BitPayProcessor::new(Client::new(), "http://localhost", "token", "whsec")
    }

    #[test]
    fn webhook_reference_comes_from_order_id() {
        let payload = serde_json::json!({
            "event": {"code": 1006, "name": "invoice_completed"},
            "data": {"id": "Inv123", "orderId": "PAY-1", "status": "complete"}
        });
        let event = processor().parse_webhook_event(&payload).unwrap();
        assert_eq!(event.reference, "PAY-1");
        assert_eq!(event.event_id, "invoice_completed:Inv123");
        assert_eq!(event.status, PaymentStatus::Completed);
    }

    #[test]
    fn expired_invoices_are_abandoned() {
        assert_eq!(map_status("expired"), PaymentStatus::Abandoned);
        assert_eq!(map_status("paid"), PaymentStatus::Pending);
    }

    #[test]
    fn signature_is_sha256_of_body() {
        let body = br#"{"data":{}}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign_sha256("whsec", body)).unwrap(),
        );
        assert!(processor().verify_webhook_signature(&headers, body));
        assert!(!processor().verify_webhook_signature(&headers, b"{}"));
    }
}
