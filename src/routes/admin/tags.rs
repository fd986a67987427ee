use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    helpers::tags::{TagInput, create_tag, delete_tag, fetch_tag, fetch_tags, update_tag},
    models::TagEntity,
    routes::catalog::SearchQuery,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_tags, add_tag))
        .routes(utoipa_axum::routes!(get_tag, edit_tag, remove_tag))
}

#[utoipa::path(
    get,
    path = "/tags",
    tags = ["Admin tags"],
    security(("bearerAuth" = [])),
    params(SearchQuery),
    responses(
        (status = 200, description = "List tags", body = StdResponse<Vec<TagEntity>, String>)
    )
)]
async fn get_tags(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tags = fetch_tags(conn, query.search.as_deref()).await?;

    Ok(StdResponse {
        data: Some(tags),
        message: Some("Get tags successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/tags/{id}",
    tags = ["Admin tags"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Tag id")
    ),
    responses(
        (status = 200, description = "Get tag successfully", body = StdResponse<TagEntity, String>),
        (status = 404, description = "No such tag")
    )
)]
async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag = fetch_tag(conn, &id.to_string()).await?;

    Ok(StdResponse {
        data: Some(tag),
        message: Some("Get tag successfully"),
    })
}

#[utoipa::path(
    post,
    path = "/tags",
    tags = ["Admin tags"],
    security(("bearerAuth" = [])),
    request_body = TagInput,
    responses(
        (status = 200, description = "Tag created", body = StdResponse<TagEntity, String>),
        (status = 409, description = "Tag already exists")
    )
)]
async fn add_tag(
    State(state): State<AppState>,
    Json(payload): Json<TagInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag = create_tag(conn, payload).await?;

    Ok(StdResponse {
        data: Some(tag),
        message: Some("Tag created successfully"),
    })
}

#[utoipa::path(
    put,
    path = "/tags/{id}",
    tags = ["Admin tags"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Tag id")
    ),
    request_body = TagInput,
    responses(
        (status = 200, description = "Tag updated", body = StdResponse<TagEntity, String>),
        (status = 409, description = "Tag already exists")
    )
)]
async fn edit_tag(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<TagInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag = update_tag(conn, id, payload).await?;

    Ok(StdResponse {
        data: Some(tag),
        message: Some("Tag updated successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/tags/{id}",
    tags = ["Admin tags"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Tag id")
    ),
    responses(
        (status = 200, description = "Tag deleted", body = StdResponse<TagEntity, String>),
        (status = 404, description = "No such tag")
    )
)]
async fn remove_tag(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag = delete_tag(conn, id).await?;

    Ok(StdResponse {
        data: Some(tag),
        message: Some("Tag deleted successfully"),
    })
}
