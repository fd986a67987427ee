use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::AuthUser,
        middleware,
        pagination::{PageQuery, Paginated},
    },
    enums::PaymentType,
    helpers::{
        payments::{GatewayPaymentRequest, PaymentInitialization, PaymentManager, TopUpInput},
        wallet::{WalletView, fetch_transactions, wallet_view},
    },
    models::TransactionEntity,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/wallet",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_wallet))
            .routes(utoipa_axum::routes!(get_transactions))
            .routes(utoipa_axum::routes!(top_up))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::customer_authorization,
            )),
    )
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Wallet"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get wallet successfully", body = StdResponse<WalletView, String>)
    )
)]
async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let wallet = wallet_view(conn, &state.settings_cache, user.id).await?;

    Ok(StdResponse {
        data: Some(wallet),
        message: Some("Get wallet successfully"),
    })
}

/// Wallet ledger, newest first.
#[utoipa::path(
    get,
    path = "/transactions",
    tags = ["Wallet"],
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "List transactions", body = StdResponse<Paginated<TransactionEntity>, String>)
    )
)]
async fn get_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let transactions = fetch_transactions(conn, user.id, &page).await?;

    Ok(StdResponse {
        data: Some(transactions),
        message: Some("Get transactions successfully"),
    })
}

/// Start a gateway payment that credits the wallet once verified.
#[utoipa::path(
    post,
    path = "/top-up",
    tags = ["Wallet"],
    security(("bearerAuth" = [])),
    request_body = TopUpInput,
    responses(
        (status = 200, description = "Payment initialized", body = StdResponse<PaymentInitialization, String>),
        (status = 400, description = "Invalid amount or no gateway configured"),
        (status = 502, description = "Payment gateway failed")
    )
)]
async fn top_up(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TopUpInput>,
) -> Result<impl IntoResponse, AppError> {
    let initialization = PaymentManager::new(&state)
        .initialize_gateway_payment(GatewayPaymentRequest {
            user_id: user.id,
            amount: payload.amount,
            narration: Some("Wallet top-up".into()),
            payment_type: PaymentType::WalletTopUp,
            order_id: None,
        })
        .await?;

    Ok(StdResponse {
        data: Some(initialization),
        message: Some("Payment initialized successfully"),
    })
}
