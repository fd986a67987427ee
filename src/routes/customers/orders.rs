use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::AuthUser,
        middleware,
        pagination::{PageQuery, Paginated},
    },
    helpers::{
        checkout::{CheckoutInput, CheckoutResult, checkout, pay_pending_order},
        orders::{fetch_order_items, fetch_user_order, fetch_user_orders},
        payments::PaymentInitialization,
    },
    models::{OrderEntity, OrderItemEntity},
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_orders))
            .routes(utoipa_axum::routes!(get_my_order))
            .routes(utoipa_axum::routes!(checkout_cart))
            .routes(utoipa_axum::routes!(pay_order))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::customer_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
pub struct GetOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

/// Orders placed by the signed-in user.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Paginated<OrderEntity>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = fetch_user_orders(conn, user.id, &page).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get my orders successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{identifier}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("identifier" = String, Path, description = "Order id or order number")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 404, description = "No such order")
    )
)]
async fn get_my_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = fetch_user_order(conn, user.id, &identifier).await?;
    let order_items = fetch_order_items(conn, order.id).await?;

    Ok(StdResponse {
        data: Some(GetOrderRes { order, order_items }),
        message: Some("Get order successfully"),
    })
}

/// Place an order from the cart.
#[utoipa::path(
    post,
    path = "/checkout",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = CheckoutInput,
    responses(
        (status = 200, description = "Order placed; without `authorization_url` the gateway payment could not be started", body = StdResponse<CheckoutResult, String>),
        (status = 400, description = "Empty cart, insufficient balance, unavailable method or unsupported currency")
    )
)]
async fn checkout_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl IntoResponse, AppError> {
    let result = checkout(&state, user.id, payload).await?;
    let message = result.message.clone();

    Ok(StdResponse {
        data: Some(result),
        message: Some(message),
    })
}

/// Retry gateway payment for a pending order.
#[utoipa::path(
    post,
    path = "/{identifier}/pay",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("identifier" = String, Path, description = "Order id or order number")
    ),
    responses(
        (status = 200, description = "Payment initialized", body = StdResponse<PaymentInitialization, String>),
        (status = 409, description = "Order is not pending, or an earlier payment completed or is still in progress"),
        (status = 502, description = "Payment gateway failed")
    )
)]
async fn pay_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let initialization = pay_pending_order(&state, user.id, &identifier).await?;

    Ok(StdResponse {
        data: Some(initialization),
        message: Some("Payment initialized successfully"),
    })
}
