//! Back-office routes. Everything here requires a staff role.

use utoipa_axum::router::OpenApiRouter;

use crate::core::{app_state::AppState, middleware};

pub mod categories;
pub mod media;
pub mod nav_menus;
pub mod orders;
pub mod products;
pub mod settings;
pub mod stats;
pub mod tags;

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/admin",
        OpenApiRouter::new()
            .merge(products::routes())
            .merge(categories::routes())
            .merge(tags::routes())
            .merge(media::routes())
            .merge(nav_menus::routes())
            .merge(orders::routes())
            .merge(settings::routes())
            .merge(stats::routes())
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::admin_authorization,
            )),
    )
}
