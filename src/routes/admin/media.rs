use std::path::Path as FsPath;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{PageQuery, Paginated},
    },
    helpers::media::{delete_media, fetch_media_page, save_media},
    models::MediaEntity,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_media, upload_media))
        .routes(utoipa_axum::routes!(remove_media))
}

/// Multipart body with a single image in the `file` field.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Original file name and contents of the `file` field.
pub(crate) async fn read_image_upload(mut multipart: Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("The uploaded file has no name".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(err.body_text()))?;
        return Ok((filename, bytes));
    }
    Err(AppError::BadRequest("Missing `file` field".into()))
}

#[utoipa::path(
    get,
    path = "/media",
    tags = ["Admin media"],
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "List media", body = StdResponse<Paginated<MediaEntity>, String>)
    )
)]
async fn get_media(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let media = fetch_media_page(conn, &page).await?;

    Ok(StdResponse {
        data: Some(media),
        message: Some("Get media successfully"),
    })
}

/// Stores an image; reference it from products and categories by `media_id`.
#[utoipa::path(
    post,
    path = "/media",
    tags = ["Admin media"],
    security(("bearerAuth" = [])),
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Media uploaded", body = StdResponse<MediaEntity, String>),
        (status = 400, description = "Missing file or not an image")
    )
)]
async fn upload_media(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (filename, bytes) = read_image_upload(multipart).await?;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let media = save_media(conn, FsPath::new(&state.config.media_dir), &filename, &bytes).await?;

    Ok(StdResponse {
        data: Some(media),
        message: Some("Media uploaded successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/media/{id}",
    tags = ["Admin media"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Media id")
    ),
    responses(
        (status = 200, description = "Media deleted", body = StdResponse<MediaEntity, String>),
        (status = 404, description = "No such media")
    )
)]
async fn remove_media(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let media = delete_media(conn, FsPath::new(&state.config.media_dir), id).await?;

    Ok(StdResponse {
        data: Some(media),
        message: Some("Media deleted successfully"),
    })
}
