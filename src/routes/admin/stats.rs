use anyhow::Context;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    helpers::stats::{AdminStats, StatsQuery, admin_stats},
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(get_stats))
}

/// Dashboard counters and totals for `day`, `yesterday`, `month` or `year`.
#[utoipa::path(
    get,
    path = "/stats",
    tags = ["Admin dashboard"],
    security(("bearerAuth" = [])),
    params(StatsQuery),
    responses(
        (status = 200, description = "Dashboard stats", body = StdResponse<AdminStats, String>),
        (status = 400, description = "Invalid period")
    )
)]
async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let stats = admin_stats(conn, query.period.as_deref()).await?;

    Ok(StdResponse {
        data: Some(stats),
        message: Some("Get stats successfully"),
    })
}
