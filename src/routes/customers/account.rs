use std::path::Path as FsPath;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
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
    helpers::{
        account::{AccountView, ProfileInput, account_view, save_profile, set_profile_picture},
        media::save_media,
    },
    routes::admin::media::{ImageUpload, read_image_upload},
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/account",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_profile, update_profile))
            .routes(utoipa_axum::routes!(upload_profile_picture))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::customer_authorization,
            )),
    )
}

#[utoipa::path(
    get,
    path = "/profile",
    tags = ["Account"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get profile", body = StdResponse<AccountView, String>)
    )
)]
async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account = account_view(conn, &state.config.domain_name, user.id).await?;

    Ok(StdResponse {
        data: Some(account),
        message: Some("Get profile successfully"),
    })
}

/// Replaces the personal details and address. Blank fields are cleared.
#[utoipa::path(
    put,
    path = "/profile",
    tags = ["Account"],
    security(("bearerAuth" = [])),
    request_body = ProfileInput,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<AccountView, String>)
    )
)]
async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<ProfileInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    save_profile(conn, user.id, input).await?;
    let account = account_view(conn, &state.config.domain_name, user.id).await?;

    Ok(StdResponse {
        data: Some(account),
        message: Some("Profile updated successfully"),
    })
}

#[utoipa::path(
    post,
    path = "/profile/picture",
    tags = ["Account"],
    security(("bearerAuth" = [])),
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Profile picture updated", body = StdResponse<AccountView, String>),
        (status = 400, description = "Missing file or not an image")
    )
)]
async fn upload_profile_picture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (filename, bytes) = read_image_upload(multipart).await?;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let media = save_media(conn, FsPath::new(&state.config.media_dir), &filename, &bytes).await?;
    set_profile_picture(conn, user.id, media.id).await?;
    let account = account_view(conn, &state.config.domain_name, user.id).await?;

    Ok(StdResponse {
        data: Some(account),
        message: Some("Profile picture updated successfully"),
    })
}
