//! Gateway payments: starting them, checking them with the provider and
//! applying the result exactly once.

use anyhow::{Context, anyhow};
use axum::http::HeaderMap;
use bigdecimal::{BigDecimal, Signed};
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::{
    api::{
        create_processor,
        processor::{CustomerData, InitializeRequest, PaymentProcessor},
    },
    core::{app_error::AppError, app_state::AppState, app_state::SettingsCache},
    enums::{GatewayName, OrderStatus, PaymentStatus, PaymentType},
    helpers::{
        settings::{active_gateway, gateway_credentials},
        wallet::{credit_wallet, get_or_create_wallet},
    },
    models::{CreatePaymentEntity, CreateProcessedWebhookEventEntity, PaymentEntity},
    schema::{app_users, customer_orders, payments, processed_webhook_events},
};

pub const WALLET_PAYMENT_METHOD: &str = "wallet";
pub const SETTLED_ORDER_MESSAGE: &str =
    "Order was already paid for. The amount has been credited to your wallet.";

/// `{prefix}-{utc timestamp}-{12 random hex chars}`, unique enough for
/// payment and ledger keys.
pub fn generate_reference(prefix: &str) -> String {
    let mut bytes = [0u8; 6];
    OsRng.fill_bytes(&mut bytes);
    format!(
        "{}-{}-{}",
        prefix.to_uppercase(),
        Utc::now().format("%Y%m%d%H%M%S"),
        hex::encode(bytes)
    )
}

/// What a provider report does to a local payment. Only pending payments
/// move; completed and abandoned are final.
pub fn next_status(current: PaymentStatus, reported: PaymentStatus) -> Option<PaymentStatus> {
    match (current, reported) {
        (PaymentStatus::Pending, PaymentStatus::Completed) => Some(PaymentStatus::Completed),
        (PaymentStatus::Pending, PaymentStatus::Abandoned) => Some(PaymentStatus::Abandoned),
        _ => None,
    }
}

pub fn outcome_message(status: PaymentStatus, payment_type: PaymentType) -> &'static str {
    match (status, payment_type) {
        (PaymentStatus::Completed, PaymentType::WalletTopUp) => {
            "Wallet has been credited successfully!"
        }
        (PaymentStatus::Completed, PaymentType::OrderPayment) => "Order has been paid for!",
        _ => "Payment verification failed",
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub reference: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub order_id: Option<i32>,
    pub message: String,
    /// False when nothing changed, e.g. a repeated webhook delivery.
    pub applied: bool,
}

impl PaymentOutcome {
    fn new(payment: &PaymentEntity, applied: bool) -> Self {
        let status = payment.status().unwrap_or(PaymentStatus::Pending);
        let payment_type = payment.payment_type();
        Self {
            reference: payment.key.clone(),
            status,
            payment_type,
            order_id: payment.order_id(),
            message: outcome_message(status, payment_type).to_string(),
            applied,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Storefront page a browser lands on after returning from the gateway.
    pub fn redirect_path(&self) -> String {
        match (self.is_completed(), self.payment_type, self.order_id) {
            (true, PaymentType::WalletTopUp, _) => "/wallet/top-up".to_string(),
            (true, PaymentType::OrderPayment, Some(order_id)) => format!("/orders/{order_id}"),
            _ => "/".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayPaymentRequest {
    pub user_id: i32,
    pub amount: BigDecimal,
    pub narration: Option<String>,
    pub payment_type: PaymentType,
    pub order_id: Option<i32>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct PaymentInitialization {
    pub reference: String,
    pub provider: GatewayName,
    pub authorization_url: Option<String>,
    pub message: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct TopUpInput {
    #[schema(value_type = String)]
    pub amount: BigDecimal,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct VerifyPaymentInput {
    pub reference: String,
}

pub async fn fetch_payment(
    conn: &mut AsyncPgConnection,
    reference: &str,
) -> Result<PaymentEntity, AppError> {
    Ok(payments::table
        .filter(payments::key.eq(reference))
        .select(PaymentEntity::as_select())
        .first(conn)
        .await?)
}

/// The first of `references` that names a payment.
pub async fn find_payment_by_references(
    conn: &mut AsyncPgConnection,
    references: &[String],
) -> Result<Option<PaymentEntity>, AppError> {
    Ok(payments::table
        .filter(payments::key.eq_any(references))
        .select(PaymentEntity::as_select())
        .first(conn)
        .await
        .optional()?)
}

async fn set_status(
    conn: &mut AsyncPgConnection,
    reference: &str,
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<Option<PaymentEntity>, AppError> {
    Ok(diesel::update(
        payments::table
            .filter(payments::key.eq(reference))
            .filter(payments::status.eq(from.as_str())),
    )
    .set((
        payments::status.eq(to.as_str()),
        payments::updated_at.eq(Utc::now()),
    ))
    .returning(PaymentEntity::as_returning())
    .get_result(conn)
    .await
    .optional()?)
}

/// Settles a pending order with `payment_id`. `false` when the order was
/// already settled by another payment.
async fn mark_order_paid(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    payment_id: i32,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        customer_orders::table
            .filter(customer_orders::id.eq(order_id))
            .filter(customer_orders::status.eq(OrderStatus::Pending.as_str()))
            .filter(customer_orders::payment_id.is_null()),
    )
    .set((
        customer_orders::status.eq(OrderStatus::Paid.as_str()),
        customer_orders::payment_id.eq(Some(payment_id)),
        customer_orders::updated_at.eq(Utc::now()),
    ))
    .execute(conn)
    .await?;
    if updated == 1 {
        return Ok(true);
    }

    let exists: i64 = customer_orders::table
        .filter(customer_orders::id.eq(order_id))
        .count()
        .get_result(conn)
        .await?;
    if exists == 0 {
        return Err(anyhow!("Order {order_id} paid by payment {payment_id} does not exist").into());
    }
    Ok(false)
}

/// Pending gateway payments opened for `order_id` by its owner.
pub async fn pending_order_payments(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    order_id: i32,
) -> Result<Vec<PaymentEntity>, AppError> {
    let pending: Vec<PaymentEntity> = payments::table
        .filter(payments::user_id.eq(user_id))
        .filter(payments::status.eq(PaymentStatus::Pending.as_str()))
        .filter(payments::payment_method.ne(WALLET_PAYMENT_METHOD))
        .select(PaymentEntity::as_select())
        .order_by(payments::created_at.asc())
        .load(conn)
        .await?;
    Ok(pending
        .into_iter()
        .filter(|payment| {
            payment.payment_type() == PaymentType::OrderPayment
                && payment.order_id() == Some(order_id)
        })
        .collect())
}

/// A webhook may only settle payments started with the gateway that sent it.
pub fn ensure_same_provider(payment: &PaymentEntity, provider: GatewayName) -> Result<(), AppError> {
    if payment.payment_method != provider.as_str() {
        tracing::warn!(
            "{} webhook names payment {} made through {}",
            provider,
            payment.key,
            payment.payment_method
        );
        return Err(AppError::BadRequest(format!(
            "Payment {} was not made through {provider}",
            payment.key
        )));
    }
    Ok(())
}

/// Applies a provider-reported status to a payment. Must run inside a
/// transaction: the status flip and its side effect commit together.
pub async fn apply_reported_status(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    reference: &str,
    reported: PaymentStatus,
) -> Result<PaymentOutcome, AppError> {
    let payment = fetch_payment(conn, reference).await?;
    let current = payment.status().unwrap_or(PaymentStatus::Pending);
    let Some(target) = next_status(current, reported) else {
        return Ok(PaymentOutcome::new(&payment, false));
    };

    // Conditional on `pending`, so a concurrent reconciliation loses the race.
    let Some(payment) = set_status(conn, reference, PaymentStatus::Pending, target).await? else {
        let payment = fetch_payment(conn, reference).await?;
        return Ok(PaymentOutcome::new(&payment, false));
    };

    if target == PaymentStatus::Completed {
        match payment.payment_type() {
            PaymentType::WalletTopUp => {
                credit_wallet(
                    conn,
                    cache,
                    payment.user_id,
                    &payment.amount,
                    Some(format!("Wallet top-up ({})", payment.key)),
                )
                .await?;
            }
            PaymentType::OrderPayment => {
                let order_id = payment
                    .order_id()
                    .ok_or_else(|| anyhow!("Order payment {} has no order_id", payment.key))?;
                if !mark_order_paid(conn, order_id, payment.id).await? {
                    // The money arrived anyway; it goes to the payer's wallet.
                    tracing::warn!(
                        "Order {} was already settled, crediting payment {} to the wallet",
                        order_id,
                        payment.key
                    );
                    credit_wallet(
                        conn,
                        cache,
                        payment.user_id,
                        &payment.amount,
                        Some(format!("Refund of {} for settled order {order_id}", payment.key)),
                    )
                    .await?;
                    let mut outcome = PaymentOutcome::new(&payment, true);
                    outcome.message = SETTLED_ORDER_MESSAGE.to_string();
                    return Ok(outcome);
                }
            }
        }
        tracing::info!("Payment {} completed", payment.key);
    } else {
        tracing::info!("Payment {} marked {}", payment.key, target);
    }

    Ok(PaymentOutcome::new(&payment, true))
}

fn unsupported_currency(provider: GatewayName, currency: &str) -> AppError {
    AppError::BadRequest(format!("{provider} does not support {currency}"))
}

/// Selects processors from the stored gateway settings and reconciles
/// payments against them.
pub struct PaymentManager<'a> {
    state: &'a AppState,
}

impl<'a> PaymentManager<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Processor of the gateway currently configured for new payments.
    pub async fn active_processor(&self) -> Result<Box<dyn PaymentProcessor>, AppError> {
        let conn = &mut self
            .state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let (provider, credentials) = active_gateway(conn, &self.state.settings_cache)
            .await?
            .ok_or_else(|| AppError::BadRequest("Payment gateway has not been set up.".into()))?;
        Ok(create_processor(
            provider,
            &credentials,
            &self.state.config.gateways,
            self.state.http_client.clone(),
        ))
    }

    /// Processor of the gateway a payment was started with, which may no
    /// longer be the active one.
    async fn processor_for(&self, provider: GatewayName) -> Result<Box<dyn PaymentProcessor>, AppError> {
        let conn = &mut self
            .state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let credentials = gateway_credentials(conn, &self.state.settings_cache, provider)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("No credentials are configured for {provider}"))
            })?;
        Ok(create_processor(
            provider,
            &credentials,
            &self.state.config.gateways,
            self.state.http_client.clone(),
        ))
    }

    /// Fails before anything is written when the active gateway cannot take
    /// a payment from `user_id`: none configured, or the wallet currency is
    /// not one it settles in.
    pub async fn ensure_gateway_accepts(&self, user_id: i32) -> Result<GatewayName, AppError> {
        let processor = self.active_processor().await?;
        let conn = &mut self
            .state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let wallet = get_or_create_wallet(conn, &self.state.settings_cache, user_id).await?;
        if !processor.supports_currency(&wallet.currency_code) {
            return Err(unsupported_currency(processor.name(), &wallet.currency_code));
        }
        Ok(processor.name())
    }

    fn callback_url(&self, provider: GatewayName, reference: &str) -> String {
        let base = format!(
            "{}/payments/verify?provider={provider}",
            self.state.config.domain_name.trim_end_matches('/')
        );
        match provider {
            // BitPay returns the shopper without any reference of its own.
            GatewayName::Bitpay => format!("{base}&reference={reference}"),
            _ => base,
        }
    }

    /// Creates a pending payment and opens a checkout session with the
    /// active gateway. A provider refusal abandons the payment.
    pub async fn initialize_gateway_payment(
        &self,
        request: GatewayPaymentRequest,
    ) -> Result<PaymentInitialization, AppError> {
        if !request.amount.is_positive() {
            return Err(AppError::BadRequest("Amount must be greater than zero".into()));
        }
        let processor = self.active_processor().await?;
        let provider = processor.name();

        let (payment, customer, currency) = {
            let conn = &mut self
                .state
                .db_pool
                .get()
                .await
                .context("Failed to obtain a DB connection pool")?;
            let (username, email): (String, String) = app_users::table
                .filter(app_users::id.eq(request.user_id))
                .select((app_users::username, app_users::email))
                .first(conn)
                .await?;
            let wallet =
                get_or_create_wallet(conn, &self.state.settings_cache, request.user_id).await?;
            if !processor.supports_currency(&wallet.currency_code) {
                return Err(unsupported_currency(provider, &wallet.currency_code));
            }

            let mut meta_info = json!({
                "payment_type": request.payment_type,
                "provider": provider,
                "currency": wallet.currency_code,
            });
            if let Some(order_id) = request.order_id {
                meta_info["order_id"] = json!(order_id);
            }

            let payment: PaymentEntity = diesel::insert_into(payments::table)
                .values(CreatePaymentEntity {
                    key: generate_reference("pay"),
                    amount: request.amount.clone(),
                    narration: request.narration.clone(),
                    payment_method: provider.to_string(),
                    status: PaymentStatus::Pending.to_string(),
                    meta_info,
                    user_id: request.user_id,
                })
                .returning(PaymentEntity::as_returning())
                .get_result(conn)
                .await?;
            let customer = CustomerData {
                email,
                name: username,
            };
            (payment, customer, wallet.currency_code)
        };

        let callback_url = self.callback_url(provider, &payment.key);
        let response = processor
            .initialize_payment(InitializeRequest {
                reference: &payment.key,
                amount: &payment.amount,
                currency: &currency,
                customer: &customer,
                callback_url: &callback_url,
            })
            .await;

        let conn = &mut self
            .state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let response = match response {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                set_status(conn, &payment.key, PaymentStatus::Pending, PaymentStatus::Abandoned)
                    .await?;
                tracing::warn!("{} refused payment {}: {}", provider, payment.key, response.message);
                return Err(AppError::BadRequest(format!(
                    "Payment initialization failed: {}",
                    response.message
                )));
            }
            Err(err) => {
                set_status(conn, &payment.key, PaymentStatus::Pending, PaymentStatus::Abandoned)
                    .await?;
                return Err(err);
            }
        };

        if let Some(provider_reference) = response.payment_id.as_deref() {
            let mut meta_info = payment.meta_info.clone();
            meta_info["provider_reference"] = Value::from(provider_reference);
            diesel::update(payments::table.find(payment.id))
                .set(payments::meta_info.eq(meta_info))
                .execute(conn)
                .await?;
        }

        tracing::info!("Initialized {} payment {}", provider, payment.key);
        Ok(PaymentInitialization {
            reference: payment.key,
            provider,
            authorization_url: response.authorization_url,
            message: response.message,
        })
    }

    /// Re-checks a payment with its provider and applies the result. Final
    /// payments are reported as they are without contacting the provider.
    pub async fn verify_gateway_payment(&self, reference: &str) -> Result<PaymentOutcome, AppError> {
        let payment = {
            let conn = &mut self
                .state
                .db_pool
                .get()
                .await
                .context("Failed to obtain a DB connection pool")?;
            fetch_payment(conn, reference).await?
        };
        if payment.status() != Some(PaymentStatus::Pending) {
            return Ok(PaymentOutcome::new(&payment, false));
        }

        let provider: GatewayName = payment.payment_method.parse().map_err(|_| {
            AppError::BadRequest(format!("Payment {} was not made through a gateway", payment.key))
        })?;
        let processor = self.processor_for(provider).await?;
        let lookup = match provider {
            GatewayName::Bitpay => payment
                .meta_info
                .get("provider_reference")
                .and_then(Value::as_str)
                .unwrap_or(&payment.key),
            _ => &payment.key,
        };
        let verification = processor.verify_payment(lookup).await?;

        let conn = &mut self
            .state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let cache = &self.state.settings_cache;
        let key = payment.key.clone();
        conn.transaction(move |conn| {
            Box::pin(async move { apply_reported_status(conn, cache, &key, verification.status).await })
        })
        .await
    }

    /// Verifies the signature of a gateway callback and applies the event it
    /// carries. Event ids are recorded so redeliveries are acknowledged
    /// without effect.
    pub async fn handle_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<PaymentOutcome, AppError> {
        let processor = self.active_processor().await?;
        if !processor.verify_webhook_signature(headers, body) {
            tracing::warn!("Rejected {} webhook with a bad signature", processor.name());
            return Err(AppError::InvalidSignature);
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|err| AppError::BadRequest(format!("Webhook body is not JSON: {err}")))?;
        let event = processor.parse_webhook_event(&payload)?;
        tracing::debug!("Webhook event {} for payment {}", event.event_id, event.reference);

        let conn = &mut self
            .state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let cache = &self.state.settings_cache;
        conn.transaction(move |conn| {
            Box::pin(async move {
                let payment = fetch_payment(conn, &event.reference).await?;
                ensure_same_provider(&payment, event.provider)?;

                let recorded = diesel::insert_into(processed_webhook_events::table)
                    .values(CreateProcessedWebhookEventEntity {
                        event_id: event.event_id.clone(),
                        provider: event.provider.to_string(),
                        payment_key: event.reference.clone(),
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;
                if recorded == 0 {
                    tracing::info!("Webhook event {} was already processed", event.event_id);
                    return Ok(PaymentOutcome::new(&payment, false));
                }
                apply_reported_status(conn, cache, &event.reference, event.status).await
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: PaymentStatus, payment_type: PaymentType, order_id: Option<i32>) -> PaymentOutcome {
        PaymentOutcome {
            reference: "PAY-1".into(),
            status,
            payment_type,
            order_id,
            message: outcome_message(status, payment_type).into(),
            applied: true,
        }
    }

    #[test]
    fn only_pending_payments_move() {
        use PaymentStatus::*;
        assert_eq!(next_status(Pending, Completed), Some(Completed));
        assert_eq!(next_status(Pending, Abandoned), Some(Abandoned));
        assert_eq!(next_status(Pending, Pending), None);
        assert_eq!(next_status(Completed, Completed), None);
        assert_eq!(next_status(Completed, Abandoned), None);
        assert_eq!(next_status(Abandoned, Completed), None);
    }

    #[test]
    fn messages_follow_payment_type() {
        assert_eq!(
            outcome_message(PaymentStatus::Completed, PaymentType::WalletTopUp),
            "Wallet has been credited successfully!"
        );
        assert_eq!(
            outcome_message(PaymentStatus::Completed, PaymentType::OrderPayment),
            "Order has been paid for!"
        );
        assert_eq!(
            outcome_message(PaymentStatus::Abandoned, PaymentType::OrderPayment),
            "Payment verification failed"
        );
    }

    #[test]
    fn redirect_paths() {
        assert_eq!(
            outcome(PaymentStatus::Completed, PaymentType::WalletTopUp, None).redirect_path(),
            "/wallet/top-up"
        );
        assert_eq!(
            outcome(PaymentStatus::Completed, PaymentType::OrderPayment, Some(12)).redirect_path(),
            "/orders/12"
        );
        assert_eq!(
            outcome(PaymentStatus::Pending, PaymentType::OrderPayment, Some(12)).redirect_path(),
            "/"
        );
    }

    #[test]
    fn webhooks_only_settle_their_own_gateway_payments() {
        let payment = PaymentEntity {
            id: 1,
            key: "PAY-1".into(),
            amount: BigDecimal::from(2500),
            narration: None,
            payment_method: "flutterwave".into(),
            status: "pending".into(),
            meta_info: json!({"payment_type": "wallet_top_up"}),
            user_id: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ensure_same_provider(&payment, GatewayName::Flutterwave).is_ok());
        assert!(matches!(
            ensure_same_provider(&payment, GatewayName::Paystack),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn references_are_prefixed_and_distinct() {
        let first = generate_reference("pay");
        let second = generate_reference("pay");
        assert!(first.starts_with("PAY-"));
        assert_eq!(first.len(), "PAY-".len() + 14 + 1 + 12);
        assert_ne!(first, second);
    }
}
