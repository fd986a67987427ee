use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::AuthUser,
        pagination::{PageQuery, Paginated},
    },
    helpers::products::{
        ProductDetail, ProductFilter, ProductInput, create_product, delete_product, fetch_product,
        fetch_products, product_detail, update_product,
    },
    models::ProductEntity,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_products, add_product))
        .routes(utoipa_axum::routes!(get_product, edit_product, remove_product))
}

/// Every product, drafts included.
#[utoipa::path(
    get,
    path = "/products",
    tags = ["Admin products"],
    security(("bearerAuth" = [])),
    params(PageQuery, ProductFilter),
    responses(
        (status = 200, description = "List products", body = StdResponse<Paginated<ProductEntity>, String>)
    )
)]
async fn get_products(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = fetch_products(conn, &filter, &page, false).await?;

    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/products/{identifier}",
    tags = ["Admin products"],
    security(("bearerAuth" = [])),
    params(
        ("identifier" = String, Path, description = "Product id, uuid or slug")
    ),
    responses(
        (status = 200, description = "Get product successfully", body = StdResponse<ProductDetail, String>),
        (status = 404, description = "No such product")
    )
)]
async fn get_product(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = fetch_product(conn, &identifier).await?;
    let detail = product_detail(conn, product).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Get product successfully"),
    })
}

/// Products without a category land in `uncategorized`.
#[utoipa::path(
    post,
    path = "/products",
    tags = ["Admin products"],
    security(("bearerAuth" = [])),
    request_body = ProductInput,
    responses(
        (status = 200, description = "Product created", body = StdResponse<ProductDetail, String>),
        (status = 400, description = "Invalid input")
    )
)]
async fn add_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let detail = create_product(conn, user.id, payload).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Product created successfully"),
    })
}

#[utoipa::path(
    put,
    path = "/products/{identifier}",
    tags = ["Admin products"],
    security(("bearerAuth" = [])),
    params(
        ("identifier" = String, Path, description = "Product id, uuid or slug")
    ),
    request_body = ProductInput,
    responses(
        (status = 200, description = "Product updated", body = StdResponse<ProductDetail, String>),
        (status = 404, description = "No such product")
    )
)]
async fn edit_product(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(payload): Json<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = fetch_product(conn, &identifier).await?;
    let detail = update_product(conn, product.id, payload).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Product updated successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/products/{identifier}",
    tags = ["Admin products"],
    security(("bearerAuth" = [])),
    params(
        ("identifier" = String, Path, description = "Product id, uuid or slug")
    ),
    responses(
        (status = 200, description = "Product deleted", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "No such product")
    )
)]
async fn remove_product(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = fetch_product(conn, &identifier).await?;
    let deleted = delete_product(conn, product.id).await?;
    tracing::info!("Deleted product {}", deleted.uuid);

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Product deleted successfully"),
    })
}
