use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{PageQuery, Paginated},
    },
    enums::OrderStatus,
    helpers::orders::{
        NewOrderLine, OrderFilter, OrderSummary, add_order_item, distinct_statuses, fetch_order,
        fetch_order_items, fetch_orders, set_deleted, set_order_item_quantity, update_status,
    },
    models::{OrderEntity, ProductEntity},
    routes::customers::orders::GetOrderRes,
    schema::products,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_orders))
        .routes(utoipa_axum::routes!(get_order_statuses))
        .routes(utoipa_axum::routes!(get_order, trash_order))
        .routes(utoipa_axum::routes!(change_order_status))
        .routes(utoipa_axum::routes!(restore_order))
        .routes(utoipa_axum::routes!(add_item))
        .routes(utoipa_axum::routes!(change_item_quantity))
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct OrderStatusInput {
    pub status: OrderStatus,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct AddOrderItemInput {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct OrderItemQuantityInput {
    pub quantity: i32,
}

/// Orders with their customer, filterable by status and searchable by
/// order number or username. `deleted=true` lists the trash.
#[utoipa::path(
    get,
    path = "/orders",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(PageQuery, OrderFilter),
    responses(
        (status = 200, description = "List orders", body = StdResponse<Paginated<OrderSummary>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = fetch_orders(conn, &filter, &page).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get orders successfully"),
    })
}

/// Statuses currently in use, for the filter dropdown.
#[utoipa::path(
    get,
    path = "/orders/statuses",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Order statuses", body = StdResponse<Vec<String>, String>)
    )
)]
async fn get_order_statuses(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let statuses = distinct_statuses(conn).await?;

    Ok(StdResponse {
        data: Some(statuses),
        message: Some("Get order statuses successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = String, Path, description = "Order id or order number")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 404, description = "No such order")
    )
)]
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = fetch_order(conn, &id).await?;
    let order_items = fetch_order_items(conn, order.id).await?;

    Ok(StdResponse {
        data: Some(GetOrderRes { order, order_items }),
        message: Some("Get order successfully"),
    })
}

#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order id")
    ),
    request_body = OrderStatusInput,
    responses(
        (status = 200, description = "Order status updated", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "No such order")
    )
)]
async fn change_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<OrderStatusInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = update_status(conn, id, payload.status).await?;
    tracing::info!("Order {} is now {}", order.order_number, order.status);

    Ok(StdResponse {
        data: Some(order),
        message: Some("Order status updated successfully"),
    })
}

/// Soft delete; the order moves to the trash.
#[utoipa::path(
    delete,
    path = "/orders/{id}",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = String, Path, description = "Order id or order number")
    ),
    responses(
        (status = 200, description = "Order moved to trash", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "No such order, or already trashed")
    )
)]
async fn trash_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = fetch_order(conn, &id).await?;
    let order = set_deleted(conn, order.id, true).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Order moved to trash"),
    })
}

#[utoipa::path(
    post,
    path = "/orders/{id}/restore",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order id")
    ),
    responses(
        (status = 200, description = "Order restored", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "No such order in the trash")
    )
)]
async fn restore_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = set_deleted(conn, id, false).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Order restored"),
    })
}

/// Adds a product at its current selling price and recomputes the total.
#[utoipa::path(
    post,
    path = "/orders/{id}/items",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order id")
    ),
    request_body = AddOrderItemInput,
    responses(
        (status = 200, description = "Item added", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "No such order or product")
    )
)]
async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<AddOrderItemInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order = fetch_order(conn, &id.to_string()).await?;
                let product: ProductEntity = products::table
                    .find(payload.product_id)
                    .select(ProductEntity::as_select())
                    .first(conn)
                    .await?;
                add_order_item(
                    conn,
                    order.id,
                    NewOrderLine {
                        product_id: product.id,
                        quantity: payload.quantity,
                        unit_price: product.selling_price,
                    },
                )
                .await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Item added to order"),
    })
}

/// Zero or less removes the item.
#[utoipa::path(
    patch,
    path = "/orders/{id}/items/{item_id}",
    tags = ["Admin orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order id"),
        ("item_id" = i32, Path, description = "Order item id")
    ),
    request_body = OrderItemQuantityInput,
    responses(
        (status = 200, description = "Item updated", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "No such item on this order")
    )
)]
async fn change_item_quantity(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(i32, i32)>,
    Json(payload): Json<OrderItemQuantityInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                set_order_item_quantity(conn, id, item_id, payload.quantity).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Order item updated"),
    })
}
