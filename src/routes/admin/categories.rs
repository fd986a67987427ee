use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    helpers::categories::{
        CategoryDeletion, CategoryInput, CategoryNode, create_category, delete_category,
        fetch_categories, fetch_category, fetch_category_tree, update_category,
    },
    models::CategoryEntity,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_categories, add_category))
        .routes(utoipa_axum::routes!(get_category_tree))
        .routes(utoipa_axum::routes!(get_category, edit_category, remove_category))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct CategoryQuery {
    /// Children of this category only.
    pub parent_id: Option<i32>,
    /// Root categories only. Ignored when `parent_id` is set.
    #[serde(default)]
    pub parent_only: bool,
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/categories",
    tags = ["Admin categories"],
    security(("bearerAuth" = [])),
    params(CategoryQuery),
    responses(
        (status = 200, description = "List categories", body = StdResponse<Vec<CategoryEntity>, String>)
    )
)]
async fn get_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let categories = fetch_categories(
        conn,
        query.parent_id,
        query.parent_only,
        query.search.as_deref(),
    )
    .await?;

    Ok(StdResponse {
        data: Some(categories),
        message: Some("Get categories successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/categories/tree",
    tags = ["Admin categories"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Category tree", body = StdResponse<Vec<CategoryNode>, String>)
    )
)]
async fn get_category_tree(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tree = fetch_category_tree(conn).await?;

    Ok(StdResponse {
        data: Some(tree),
        message: Some("Get category tree successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    tags = ["Admin categories"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Category id")
    ),
    responses(
        (status = 200, description = "Get category successfully", body = StdResponse<CategoryEntity, String>),
        (status = 404, description = "No such category")
    )
)]
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category = fetch_category(conn, &id.to_string()).await?;

    Ok(StdResponse {
        data: Some(category),
        message: Some("Get category successfully"),
    })
}

#[utoipa::path(
    post,
    path = "/categories",
    tags = ["Admin categories"],
    security(("bearerAuth" = [])),
    request_body = CategoryInput,
    responses(
        (status = 200, description = "Category created", body = StdResponse<CategoryEntity, String>),
        (status = 409, description = "Name already used at this level")
    )
)]
async fn add_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category = create_category(conn, payload).await?;

    Ok(StdResponse {
        data: Some(category),
        message: Some("Category created successfully"),
    })
}

/// Rejects a parent that would put the category inside its own subtree.
#[utoipa::path(
    put,
    path = "/categories/{id}",
    tags = ["Admin categories"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Category id")
    ),
    request_body = CategoryInput,
    responses(
        (status = 200, description = "Category updated", body = StdResponse<CategoryEntity, String>),
        (status = 400, description = "Invalid parent")
    )
)]
async fn edit_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CategoryInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category = update_category(conn, id, payload).await?;

    Ok(StdResponse {
        data: Some(category),
        message: Some("Category updated successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tags = ["Admin categories"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Category id")
    ),
    responses(
        (status = 200, description = "Category deleted", body = StdResponse<CategoryDeletion, String>),
        (status = 400, description = "The uncategorized category cannot be deleted")
    )
)]
async fn remove_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deletion = delete_category(conn, id).await?;

    Ok(StdResponse {
        data: Some(deletion),
        message: Some("Category deleted successfully"),
    })
}
