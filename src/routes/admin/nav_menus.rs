use anyhow::Context;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    helpers::nav_menus::{
        NavItemInput, NavMenuDetail, NavMenuInput, create_menu, delete_menu, fetch_menu,
        fetch_menus, menu_detail, save_items, update_menu,
    },
    models::NavigationMenuEntity,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_menus, add_menu))
        .routes(utoipa_axum::routes!(get_menu, edit_menu, remove_menu))
        .routes(utoipa_axum::routes!(replace_menu_items))
}

#[utoipa::path(
    get,
    path = "/nav-menus",
    tags = ["Admin menus"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List menus", body = StdResponse<Vec<NavigationMenuEntity>, String>)
    )
)]
async fn get_menus(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menus = fetch_menus(conn).await?;

    Ok(StdResponse {
        data: Some(menus),
        message: Some("Get menus successfully"),
    })
}

/// A menu with every item, inactive ones included.
#[utoipa::path(
    get,
    path = "/nav-menus/{id}",
    tags = ["Admin menus"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu id")
    ),
    responses(
        (status = 200, description = "Get menu successfully", body = StdResponse<NavMenuDetail, String>),
        (status = 404, description = "No such menu")
    )
)]
async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menu = fetch_menu(conn, &id.to_string()).await?;
    let detail = menu_detail(conn, menu, false).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Get menu successfully"),
    })
}

#[utoipa::path(
    post,
    path = "/nav-menus",
    tags = ["Admin menus"],
    security(("bearerAuth" = [])),
    request_body = NavMenuInput,
    responses(
        (status = 200, description = "Menu created", body = StdResponse<NavigationMenuEntity, String>)
    )
)]
async fn add_menu(
    State(state): State<AppState>,
    Json(payload): Json<NavMenuInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menu = create_menu(conn, payload).await?;

    Ok(StdResponse {
        data: Some(menu),
        message: Some("Menu created successfully"),
    })
}

#[utoipa::path(
    put,
    path = "/nav-menus/{id}",
    tags = ["Admin menus"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu id")
    ),
    request_body = NavMenuInput,
    responses(
        (status = 200, description = "Menu updated", body = StdResponse<NavigationMenuEntity, String>),
        (status = 404, description = "No such menu")
    )
)]
async fn edit_menu(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<NavMenuInput>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menu = update_menu(conn, id, payload).await?;

    Ok(StdResponse {
        data: Some(menu),
        message: Some("Menu updated successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/nav-menus/{id}",
    tags = ["Admin menus"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu id")
    ),
    responses(
        (status = 200, description = "Menu deleted", body = StdResponse<NavigationMenuEntity, String>),
        (status = 404, description = "No such menu")
    )
)]
async fn remove_menu(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menu = delete_menu(conn, id).await?;

    Ok(StdResponse {
        data: Some(menu),
        message: Some("Menu deleted successfully"),
    })
}

/// Replaces the whole item tree. Items reference their parent by `parent_key`.
#[utoipa::path(
    put,
    path = "/nav-menus/{id}/items",
    tags = ["Admin menus"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Menu id")
    ),
    request_body = Vec<NavItemInput>,
    responses(
        (status = 200, description = "Menu items saved", body = StdResponse<NavMenuDetail, String>),
        (status = 400, description = "Unknown reference, duplicate key or parent cycle")
    )
)]
async fn replace_menu_items(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<Vec<NavItemInput>>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menu = fetch_menu(conn, &id.to_string()).await?;
    let detail = save_items(conn, menu.id, payload).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Menu items saved successfully"),
    })
}
