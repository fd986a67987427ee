use anyhow::Context;
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    routing,
};
use reqwest::Url;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::AuthUser,
        middleware,
    },
    helpers::payments::{
        PaymentManager, PaymentOutcome, VerifyPaymentInput, fetch_payment,
        find_payment_by_references,
    },
};

/// API routes: the shopper's verify call and the gateway webhook.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/payments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(payment_webhook))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(verify_payment))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state,
                        middleware::customer_authorization,
                    )),
            ),
    )
}

/// Browser return URL the gateways send the shopper back to. Not part of the
/// JSON API, so it stays out of the OpenAPI document.
pub fn routes() -> Router<AppState> {
    Router::new().route("/payments/verify", routing::get(gateway_return))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct GatewayReturnQuery {
    pub provider: Option<String>,
    pub tx_ref: Option<String>,
    pub reference: Option<String>,
    pub id: Option<String>,
}

impl GatewayReturnQuery {
    /// Candidate references in the order the providers use them.
    fn references(&self) -> Vec<String> {
        [&self.tx_ref, &self.reference, &self.id]
            .into_iter()
            .flatten()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

/// `path?status=..&message=..`, query encoded.
fn redirect_target(path: &str, status: &str, message: &str) -> String {
    match Url::parse_with_params(
        "http://localhost/",
        &[("status", status), ("message", message)],
    ) {
        Ok(url) => format!("{path}?{}", url.query().unwrap_or_default()),
        Err(_) => path.to_string(),
    }
}

/// Re-checks a payment with its gateway. Only the payment's owner may ask.
#[utoipa::path(
    post,
    path = "/verify",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = VerifyPaymentInput,
    responses(
        (status = 200, description = "Payment verified", body = StdResponse<PaymentOutcome, String>),
        (status = 400, description = "Payment verification failed"),
        (status = 404, description = "No such payment")
    )
)]
async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<VerifyPaymentInput>,
) -> Result<impl IntoResponse, AppError> {
    {
        let conn = &mut state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let payment = fetch_payment(conn, &payload.reference).await?;
        if payment.user_id != user.id && !user.role.is_staff() {
            return Err(AppError::NotFound);
        }
    }

    let outcome = PaymentManager::new(&state)
        .verify_gateway_payment(&payload.reference)
        .await?;
    if !outcome.is_completed() {
        return Err(AppError::BadRequest(outcome.message));
    }

    let message = outcome.message.clone();
    Ok(StdResponse {
        data: Some(outcome),
        message: Some(message),
    })
}

/// Gateway callback. Authenticated by the provider signature only.
#[utoipa::path(
    post,
    path = "/webhook",
    tags = ["Payments"],
    request_body(content = String, description = "Raw provider event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed", body = StdResponse<PaymentOutcome, String>),
        (status = 400, description = "Malformed event"),
        (status = 401, description = "Invalid webhook signature")
    )
)]
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let outcome = PaymentManager::new(&state)
        .handle_webhook(&headers, &body)
        .await?;

    let message = if outcome.applied {
        "Payment verified successfully".to_string()
    } else {
        outcome.message.clone()
    };
    Ok(StdResponse {
        data: Some(outcome),
        message: Some(message),
    })
}

async fn gateway_return(
    State(state): State<AppState>,
    Query(query): Query<GatewayReturnQuery>,
) -> Redirect {
    let references = query.references();
    if references.is_empty() {
        return Redirect::to(&redirect_target("/", "error", "Payment reference missing."));
    }

    let payment = match state.db_pool.get().await {
        Ok(mut conn) => find_payment_by_references(&mut conn, &references).await,
        Err(err) => Err(AppError::Other(
            anyhow::anyhow!(err).context("Failed to obtain a DB connection pool"),
        )),
    };
    let reference = match payment {
        Ok(Some(payment)) => payment.key,
        Ok(None) => {
            tracing::warn!(
                "Gateway return from {:?} with unknown references {:?}",
                query.provider,
                references
            );
            return Redirect::to(&redirect_target("/", "error", "Payment not found."));
        }
        Err(err) => {
            tracing::error!("Failed to look up returned payment: {}", err);
            return Redirect::to(&redirect_target("/", "error", "Payment verification failed"));
        }
    };

    match PaymentManager::new(&state)
        .verify_gateway_payment(&reference)
        .await
    {
        Ok(outcome) => {
            let status = if outcome.is_completed() { "success" } else { "error" };
            Redirect::to(&redirect_target(
                &outcome.redirect_path(),
                status,
                &outcome.message,
            ))
        }
        Err(err) => {
            tracing::error!("Failed to verify payment {}: {}", reference, err);
            Redirect::to(&redirect_target("/", "error", &err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_skip_blanks_and_keep_provider_order() {
        let query = GatewayReturnQuery {
            provider: Some("flutterwave".into()),
            tx_ref: Some("PAY-1".into()),
            reference: Some("  ".into()),
            id: Some("9981".into()),
        };
        assert_eq!(query.references(), vec!["PAY-1".to_string(), "9981".to_string()]);
    }

    #[test]
    fn redirect_target_encodes_message() {
        let target = redirect_target("/orders/4", "success", "Order has been paid for!");
        assert_eq!(target, "/orders/4?status=success&message=Order+has+been+paid+for%21");
    }

    #[test]
    fn empty_query_has_no_references() {
        assert!(GatewayReturnQuery::default().references().is_empty());
    }
}
