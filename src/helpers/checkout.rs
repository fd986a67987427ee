//! Turning a cart into an order and settling it.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::{
    core::{app_error::AppError, app_state::AppState},
    enums::{CheckoutMethod, OrderStatus, PaymentMethod, PaymentStatus, PaymentType, TransactionType},
    helpers::{
        cart::get_or_create_cart,
        orders::{NewOrder, NewOrderLine, create_order, fetch_order_items, fetch_user_order},
        payments::{
            GatewayPaymentRequest, PaymentInitialization, PaymentManager, WALLET_PAYMENT_METHOD,
            generate_reference, pending_order_payments,
        },
        settings::{is_enabled, load_payment_method_settings},
        wallet::debit_wallet,
    },
    models::{CartItemEntity, CreatePaymentEntity, OrderEntity, OrderItemEntity, PaymentEntity},
    schema::{cart_items, customer_orders, payments},
};

/// How long a pending gateway attempt blocks a new one for the same order.
const PAYMENT_ATTEMPT_WINDOW_MINUTES: i64 = 15;

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct CheckoutInput {
    pub payment_method: CheckoutMethod,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CheckoutResult {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub payment: Option<PaymentEntity>,
    /// Set when the shopper must finish paying on the gateway's page.
    pub authorization_url: Option<String>,
    pub message: String,
}

/// Order lines priced at what the cart captured.
pub fn order_lines(items: &[CartItemEntity]) -> Vec<NewOrderLine> {
    items
        .iter()
        .map(|item| NewOrderLine {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.price.clone(),
        })
        .collect()
}

async fn ensure_method_enabled(state: &AppState, method: PaymentMethod) -> Result<(), AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;
    let settings = load_payment_method_settings(conn, &state.settings_cache, method).await?;
    if !is_enabled(&settings) {
        return Err(AppError::BadRequest(format!("{method} payments are not available")));
    }
    Ok(())
}

/// The shopper may still be on the gateway's page for this attempt.
pub fn attempt_in_progress(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at < Duration::minutes(PAYMENT_ATTEMPT_WINDOW_MINUTES)
}

/// Message for an order that was placed while its gateway payment failed to
/// start. Internal errors are not shown to the shopper.
pub fn deferred_payment_message(order_number: &str, err: &AppError) -> String {
    let reason = match err {
        AppError::Other(_) => "an unexpected error occurred".to_string(),
        other => other.to_string(),
    };
    format!(
        "Order {order_number} was placed but the payment could not be started ({reason}). You can pay for it from your orders."
    )
}

/// Debits the wallet and records a completed `wallet` payment for the
/// order. Call inside a transaction.
async fn pay_from_wallet(
    conn: &mut AsyncPgConnection,
    state: &AppState,
    order: &OrderEntity,
) -> Result<(OrderEntity, PaymentEntity), AppError> {
    debit_wallet(
        conn,
        &state.settings_cache,
        order.user_id,
        &order.total_amount,
        TransactionType::Payment,
        Some(format!("Payment for order {}", order.order_number)),
    )
    .await?;

    let payment: PaymentEntity = diesel::insert_into(payments::table)
        .values(CreatePaymentEntity {
            key: generate_reference("pay"),
            amount: order.total_amount.clone(),
            narration: Some(format!("Payment for order {}", order.order_number)),
            payment_method: WALLET_PAYMENT_METHOD.to_string(),
            status: PaymentStatus::Completed.to_string(),
            meta_info: json!({
                "payment_type": PaymentType::OrderPayment,
                "order_id": order.id,
            }),
            user_id: order.user_id,
        })
        .returning(PaymentEntity::as_returning())
        .get_result(conn)
        .await?;

    let order: OrderEntity = diesel::update(customer_orders::table.find(order.id))
        .set((
            customer_orders::status.eq(OrderStatus::Paid.as_str()),
            customer_orders::payment_id.eq(Some(payment.id)),
            customer_orders::updated_at.eq(Utc::now()),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await?;
    Ok((order, payment))
}

async fn start_gateway_payment(
    state: &AppState,
    order: &OrderEntity,
) -> Result<PaymentInitialization, AppError> {
    PaymentManager::new(state)
        .initialize_gateway_payment(GatewayPaymentRequest {
            user_id: order.user_id,
            amount: order.total_amount.clone(),
            narration: Some(format!("Payment for order {}", order.order_number)),
            payment_type: PaymentType::OrderPayment,
            order_id: Some(order.id),
        })
        .await
}

/// Creates an order from the user's cart and empties the cart. Wallet
/// checkouts are paid in the same transaction; gateway checkouts return the
/// provider's payment page; offline methods leave the order pending.
pub async fn checkout(
    state: &AppState,
    user_id: i32,
    input: CheckoutInput,
) -> Result<CheckoutResult, AppError> {
    match input.payment_method {
        CheckoutMethod::Wallet => {}
        CheckoutMethod::Gateway => {
            ensure_method_enabled(state, PaymentMethod::Gateway).await?;
            PaymentManager::new(state).ensure_gateway_accepts(user_id).await?;
        }
        offline => {
            if let Some(method) = offline.offline_method() {
                ensure_method_enabled(state, method).await?;
            }
        }
    }

    let method = input.payment_method;
    let (order, items, payment) = {
        let conn = &mut state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        conn
            .transaction(move |conn| {
                Box::pin(async move {
                    let cart = get_or_create_cart(conn, user_id).await?;
                    let lines: Vec<CartItemEntity> = cart_items::table
                        .filter(cart_items::cart_id.eq(cart.id))
                        .select(CartItemEntity::as_select())
                        .order_by(cart_items::id.asc())
                        .load(conn)
                        .await?;
                    if lines.is_empty() {
                        return Err(AppError::BadRequest("Your cart is empty".into()));
                    }

                    let (order, items) = create_order(
                        conn,
                        NewOrder {
                            user_id,
                            lines: order_lines(&lines),
                            shipping_address: input.shipping_address,
                            billing_address: input.billing_address,
                            meta_info: json!({ "payment_method": method }),
                        },
                    )
                    .await?;
                    diesel::delete(cart_items::table.filter(cart_items::cart_id.eq(cart.id)))
                        .execute(conn)
                        .await?;

                    if method == CheckoutMethod::Wallet {
                        let (order, payment) = pay_from_wallet(conn, state, &order).await?;
                        return Ok((order, items, Some(payment)));
                    }
                    Ok((order, items, None))
                })
            })
            .await?
    };

    let (authorization_url, message) = match method {
        CheckoutMethod::Wallet => (None, "Order has been paid for!".to_string()),
        // The order is committed; a provider failure leaves it pending for a retry.
        CheckoutMethod::Gateway => match start_gateway_payment(state, &order).await {
            Ok(initialization) => (initialization.authorization_url, initialization.message),
            Err(err) => {
                tracing::warn!(
                    "Payment for order {} could not be started: {}",
                    order.order_number,
                    err
                );
                (None, deferred_payment_message(&order.order_number, &err))
            }
        },
        _ => (None, "Order placed, awaiting payment".to_string()),
    };

    Ok(CheckoutResult {
        order,
        items,
        payment,
        authorization_url,
        message,
    })
}

/// Opens a new gateway payment for one of the user's pending orders, e.g.
/// after an abandoned attempt. Earlier attempts are reconciled first; one
/// that completed, or one still fresh, blocks the new payment.
pub async fn pay_pending_order(
    state: &AppState,
    user_id: i32,
    identifier: &str,
) -> Result<PaymentInitialization, AppError> {
    let (order, attempts) = {
        let conn = &mut state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let order = fetch_user_order(conn, user_id, identifier).await?;
        if fetch_order_items(conn, order.id).await?.is_empty() {
            return Err(AppError::BadRequest("Order has no items".into()));
        }
        let attempts = pending_order_payments(conn, user_id, order.id).await?;
        (order, attempts)
    };
    if order.status != OrderStatus::Pending.as_str() {
        return Err(AppError::Conflict(format!(
            "Order {} is already {}",
            order.order_number, order.status
        )));
    }
    ensure_method_enabled(state, PaymentMethod::Gateway).await?;

    let manager = PaymentManager::new(state);
    for attempt in attempts {
        let status = match manager.verify_gateway_payment(&attempt.key).await {
            Ok(outcome) => outcome.status,
            Err(err) => {
                tracing::warn!("Could not reconcile payment {}: {}", attempt.key, err);
                PaymentStatus::Pending
            }
        };
        match status {
            PaymentStatus::Completed => {
                return Err(AppError::Conflict(format!(
                    "Order {} has already been paid for",
                    order.order_number
                )));
            }
            PaymentStatus::Pending if attempt_in_progress(attempt.created_at, Utc::now()) => {
                return Err(AppError::Conflict(format!(
                    "Payment {} for order {} is still in progress",
                    attempt.key, order.order_number
                )));
            }
            _ => {}
        }
    }

    manager.ensure_gateway_accepts(user_id).await?;
    start_gateway_payment(state, &order).await
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;

    use super::*;

    #[test]
    fn order_lines_keep_captured_prices() {
        let item = CartItemEntity {
            id: 1,
            cart_id: 2,
            product_id: 3,
            quantity: 4,
            price: BigDecimal::from_str("9.99").unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let lines = order_lines(&[item]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, 3);
        assert_eq!(lines[0].quantity, 4);
        assert_eq!(lines[0].unit_price, BigDecimal::from_str("9.99").unwrap());
    }

    #[test]
    fn fresh_attempts_block_a_new_payment() {
        let now = Utc::now();
        assert!(attempt_in_progress(now - Duration::minutes(2), now));
        assert!(!attempt_in_progress(now - Duration::minutes(16), now));
    }

    #[test]
    fn deferred_message_hides_internal_errors() {
        let shown = deferred_payment_message(
            "ORD-0007",
            &AppError::PaymentGateway("Invalid key".into()),
        );
        assert!(shown.contains("ORD-0007"));
        assert!(shown.contains("Invalid key"));

        let hidden =
            deferred_payment_message("ORD-0007", &AppError::Other(anyhow::anyhow!("pool exhausted")));
        assert!(!hidden.contains("pool exhausted"));
    }
}
