//! Public storefront reads: products, categories, tags, menus and site info.

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{PageQuery, Paginated},
    },
    enums::{GeneralSettingsKey, PublishStatus},
    helpers::{
        categories::{CategoryNode, fetch_category, fetch_category_tree},
        currencies::currency_symbol,
        nav_menus::{NavMenuDetail, fetch_menu, menu_detail},
        pages::{PREDEFINED_PAGES, PredefinedPage},
        products::{ProductDetail, ProductFilter, fetch_product, fetch_products, product_detail},
        settings::load_general_settings,
        tags::{fetch_tag, fetch_tags},
    },
    models::{CategoryEntity, ProductEntity, TagEntity},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_products))
            .routes(utoipa_axum::routes!(get_product))
            .routes(utoipa_axum::routes!(get_categories))
            .routes(utoipa_axum::routes!(get_category))
            .routes(utoipa_axum::routes!(get_tags))
            .routes(utoipa_axum::routes!(get_tag))
            .routes(utoipa_axum::routes!(get_nav_menu))
            .routes(utoipa_axum::routes!(get_site_info)),
    )
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SiteInfoRes {
    pub site_title: String,
    pub tagline: String,
    pub currency: String,
    pub currency_symbol: String,
    pub pages: Vec<PredefinedPage>,
}

/// Published products, newest first.
#[utoipa::path(
    get,
    path = "/products",
    tags = ["Catalog"],
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

    let products = fetch_products(conn, &filter, &page, true).await?;

    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

/// A published product with its categories and tags.
#[utoipa::path(
    get,
    path = "/products/{identifier}",
    tags = ["Catalog"],
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
    if product.pub_status != PublishStatus::Published.as_str() {
        return Err(AppError::NotFound);
    }
    let detail = product_detail(conn, product).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Get product successfully"),
    })
}

/// The category tree.
#[utoipa::path(
    get,
    path = "/categories",
    tags = ["Catalog"],
    responses(
        (status = 200, description = "Category tree", body = StdResponse<Vec<CategoryNode>, String>)
    )
)]
async fn get_categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tree = fetch_category_tree(conn).await?;

    Ok(StdResponse {
        data: Some(tree),
        message: Some("Get categories successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/categories/{identifier}",
    tags = ["Catalog"],
    params(
        ("identifier" = String, Path, description = "Category id or slug")
    ),
    responses(
        (status = 200, description = "Get category successfully", body = StdResponse<CategoryEntity, String>),
        (status = 404, description = "No such category")
    )
)]
async fn get_category(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category = fetch_category(conn, &identifier).await?;

    Ok(StdResponse {
        data: Some(category),
        message: Some("Get category successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/tags",
    tags = ["Catalog"],
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
    path = "/tags/{identifier}",
    tags = ["Catalog"],
    params(
        ("identifier" = String, Path, description = "Tag id or slug")
    ),
    responses(
        (status = 200, description = "Get tag successfully", body = StdResponse<TagEntity, String>),
        (status = 404, description = "No such tag")
    )
)]
async fn get_tag(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag = fetch_tag(conn, &identifier).await?;

    Ok(StdResponse {
        data: Some(tag),
        message: Some("Get tag successfully"),
    })
}

/// A navigation menu with its active items nested.
#[utoipa::path(
    get,
    path = "/nav-menus/{identifier}",
    tags = ["Catalog"],
    params(
        ("identifier" = String, Path, description = "Menu id or slug, e.g. main-menu")
    ),
    responses(
        (status = 200, description = "Get menu successfully", body = StdResponse<NavMenuDetail, String>),
        (status = 404, description = "No such menu")
    )
)]
async fn get_nav_menu(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let menu = fetch_menu(conn, &identifier).await?;
    let detail = menu_detail(conn, menu, true).await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Get menu successfully"),
    })
}

/// Title, tagline and currency the storefront renders with.
#[utoipa::path(
    get,
    path = "/site",
    tags = ["Catalog"],
    responses(
        (status = 200, description = "Site info", body = StdResponse<SiteInfoRes, String>)
    )
)]
async fn get_site_info(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let settings = load_general_settings(conn, &state.settings_cache).await?;
    let get = |key: GeneralSettingsKey| settings.get(key.as_str()).cloned().unwrap_or_default();
    let currency = get(GeneralSettingsKey::Currency);

    Ok(StdResponse {
        data: Some(SiteInfoRes {
            site_title: get(GeneralSettingsKey::SiteTitle),
            tagline: get(GeneralSettingsKey::Tagline),
            currency_symbol: currency_symbol(&currency).to_string(),
            currency,
            pages: PREDEFINED_PAGES.to_vec(),
        }),
        message: Some("Get site info successfully"),
    })
}
