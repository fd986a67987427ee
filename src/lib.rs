pub mod api;
pub mod core;
pub mod enums;
pub mod helpers;
pub mod models;
pub mod routes;
pub mod schema;

use anyhow::Result;
use axum::Router;
use tower_http::services::ServeDir;
use utoipa::openapi::{
    InfoBuilder,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::core::{app_state::AppState, swagger};

/// Builds the full application: JSON API, gateway return URL, uploaded
/// media and swagger UI.
pub fn app(state: AppState) -> Result<Router> {
    let routes = routes::auth::routes_with_openapi(state.clone())
        .merge(routes::catalog::routes_with_openapi())
        .merge(routes::customers::account::routes_with_openapi(state.clone()))
        .merge(routes::customers::cart::routes_with_openapi(state.clone()))
        .merge(routes::customers::orders::routes_with_openapi(state.clone()))
        .merge(routes::customers::wallet::routes_with_openapi(state.clone()))
        .merge(routes::payments::routes_with_openapi(state.clone()))
        .merge(routes::admin::routes_with_openapi(state.clone()));

    let mut openapi = routes.get_openapi().clone();
    openapi.info = InfoBuilder::new()
        .title("Shopfront API")
        .version(env!("CARGO_PKG_VERSION"))
        .build();
    openapi
        .components
        .get_or_insert_with(Default::default)
        .add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    Ok(Router::new()
        .merge(routes)
        .merge(routes::payments::routes())
        .merge(swagger_ui)
        .nest_service(
            helpers::media::MEDIA_URL_PREFIX,
            ServeDir::new(&state.config.media_dir),
        )
        .with_state(state))
}
