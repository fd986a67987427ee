use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::AuthUser,
        middleware,
    },
    helpers::cart::{
        CartItemInput, CartQuantityInput, CartView, add_item, clear_cart, fetch_cart, remove_item,
        set_item_quantity,
    },
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/cart",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart, clear_my_cart))
            .routes(utoipa_axum::routes!(add_cart_item))
            .routes(utoipa_axum::routes!(update_cart_item, delete_cart_item))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::customer_authorization,
            )),
    )
}

/// The signed-in user's cart with totals.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<CartView, String>)
    )
)]
async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = fetch_cart(conn, user.id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Get cart successfully"),
    })
}

/// Add a product; an existing line grows by the quantity.
#[utoipa::path(
    post,
    path = "/items",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    request_body = CartItemInput,
    responses(
        (status = 200, description = "Item added", body = StdResponse<CartView, String>),
        (status = 404, description = "Product not found or not published")
    )
)]
async fn add_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CartItemInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = add_item(conn, user.id, payload).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Item added to cart"),
    })
}

/// Set a line's quantity; zero or less removes it.
#[utoipa::path(
    patch,
    path = "/items/{product_id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product in the cart")
    ),
    request_body = CartQuantityInput,
    responses(
        (status = 200, description = "Cart updated", body = StdResponse<CartView, String>),
        (status = 404, description = "Product is not in the cart")
    )
)]
async fn update_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<i32>,
    Json(payload): Json<CartQuantityInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = set_item_quantity(conn, user.id, product_id, payload.quantity).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Cart updated"),
    })
}

#[utoipa::path(
    delete,
    path = "/items/{product_id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product to remove")
    ),
    responses(
        (status = 200, description = "Item removed", body = StdResponse<CartView, String>)
    )
)]
async fn delete_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = remove_item(conn, user.id, product_id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Item removed from cart"),
    })
}

#[utoipa::path(
    delete,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Cart emptied", body = StdResponse<usize, String>)
    )
)]
async fn clear_my_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let removed = clear_cart(conn, user.id).await?;

    Ok(StdResponse {
        data: Some(removed),
        message: Some("Cart cleared"),
    })
}
