use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    enums::{GeneralSettingsKey, PaymentMethod, PaymentMethodSettingKey},
    helpers::settings::{
        is_enabled, load_general_settings, load_payment_method_settings, save_general_settings,
        save_payment_method_settings,
    },
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_general_settings, put_general_settings))
        .routes(utoipa_axum::routes!(get_payment_methods))
        .routes(utoipa_axum::routes!(get_payment_method, put_payment_method))
}

#[derive(Serialize, ToSchema, Debug)]
pub struct PaymentMethodOverview {
    pub method: PaymentMethod,
    pub title: String,
    pub enabled: bool,
}

/// Parses a settings payload, rejecting unknown keys.
fn parse_keys<K>(values: HashMap<String, String>) -> Result<Vec<(K, String)>, AppError>
where
    K: std::str::FromStr<Err = String>,
{
    values
        .into_iter()
        .map(|(key, value)| {
            key.parse::<K>()
                .map(|key| (key, value.trim().to_string()))
                .map_err(AppError::BadRequest)
        })
        .collect()
}

fn parse_method(raw: &str) -> Result<PaymentMethod, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

#[utoipa::path(
    get,
    path = "/settings/general",
    tags = ["Admin settings"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "General settings", body = StdResponse<HashMap<String, String>, String>)
    )
)]
async fn get_general_settings(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let settings = load_general_settings(conn, &state.settings_cache).await?;

    Ok(StdResponse {
        data: Some(settings),
        message: Some("Get general settings successfully"),
    })
}

/// Upserts the given keys. Keys left out keep their value.
#[utoipa::path(
    put,
    path = "/settings/general",
    tags = ["Admin settings"],
    security(("bearerAuth" = [])),
    request_body = HashMap<String, String>,
    responses(
        (status = 200, description = "General settings saved", body = StdResponse<HashMap<String, String>, String>),
        (status = 400, description = "Unknown setting key")
    )
)]
async fn put_general_settings(
    State(state): State<AppState>,
    Json(payload): Json<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let values = parse_keys::<GeneralSettingsKey>(payload)?;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    save_general_settings(conn, &state.settings_cache, &values).await?;
    let settings = load_general_settings(conn, &state.settings_cache).await?;
    tracing::info!("Saved {} general settings", values.len());

    Ok(StdResponse {
        data: Some(settings),
        message: Some("Settings saved successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/settings/payment-methods",
    tags = ["Admin settings"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Payment methods", body = StdResponse<Vec<PaymentMethodOverview>, String>)
    )
)]
async fn get_payment_methods(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut methods = Vec::with_capacity(PaymentMethod::ALL.len());
    for method in PaymentMethod::ALL {
        let settings = load_payment_method_settings(conn, &state.settings_cache, *method).await?;
        methods.push(PaymentMethodOverview {
            method: *method,
            title: settings
                .get(PaymentMethodSettingKey::Title.as_str())
                .filter(|title| !title.is_empty())
                .cloned()
                .unwrap_or_else(|| method.to_string()),
            enabled: is_enabled(&settings),
        });
    }

    Ok(StdResponse {
        data: Some(methods),
        message: Some("Get payment methods successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/settings/payment-methods/{method}",
    tags = ["Admin settings"],
    security(("bearerAuth" = [])),
    params(
        ("method" = PaymentMethod, Path, description = "bacs, check, cod or gateway")
    ),
    responses(
        (status = 200, description = "Payment method settings", body = StdResponse<HashMap<String, String>, String>),
        (status = 404, description = "Unknown payment method")
    )
)]
async fn get_payment_method(
    State(state): State<AppState>,
    Path(method): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let method = parse_method(&method)?;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let settings = load_payment_method_settings(conn, &state.settings_cache, method).await?;

    Ok(StdResponse {
        data: Some(settings),
        message: Some("Get payment method settings successfully"),
    })
}

/// Gateway credentials are stored as `{provider}_api_key` and friends; the
/// `provider` key picks the active one.
#[utoipa::path(
    put,
    path = "/settings/payment-methods/{method}",
    tags = ["Admin settings"],
    security(("bearerAuth" = [])),
    params(
        ("method" = PaymentMethod, Path, description = "bacs, check, cod or gateway")
    ),
    request_body = HashMap<String, String>,
    responses(
        (status = 200, description = "Payment method settings saved", body = StdResponse<HashMap<String, String>, String>),
        (status = 400, description = "Unknown setting key"),
        (status = 404, description = "Unknown payment method")
    )
)]
async fn put_payment_method(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(payload): Json<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let method = parse_method(&method)?;
    let values = parse_keys::<PaymentMethodSettingKey>(payload)?;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    save_payment_method_settings(conn, &state.settings_cache, method, &values).await?;
    let settings = load_payment_method_settings(conn, &state.settings_cache, method).await?;
    tracing::info!("Saved {} settings for payment method {}", values.len(), method);

    Ok(StdResponse {
        data: Some(settings),
        message: Some("Settings saved successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_are_parsed_and_trimmed() {
        let payload = HashMap::from([("site_title".to_string(), "  Shop  ".to_string())]);
        let values = parse_keys::<GeneralSettingsKey>(payload).unwrap();
        assert_eq!(values, vec![(GeneralSettingsKey::SiteTitle, "Shop".to_string())]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let payload = HashMap::from([("favourite_colour".to_string(), "red".to_string())]);
        let err = parse_keys::<PaymentMethodSettingKey>(payload).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn unknown_method_is_not_found() {
        assert!(matches!(parse_method("crypto"), Err(AppError::NotFound)));
        assert_eq!(parse_method("gateway").unwrap(), PaymentMethod::Gateway);
    }
}
