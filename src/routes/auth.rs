use anyhow::Context;
use axum::{
    Extension, Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::{self, AuthUser, SESSION_COOKIE},
        middleware,
    },
    enums::UserRole,
    helpers::wallet::{WalletView, get_or_create_wallet, wallet_view},
    models::{AppUserEntity, CreateAppUserEntity},
    schema::app_users,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/auth",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(register))
            .routes(utoipa_axum::routes!(login))
            .routes(utoipa_axum::routes!(logout))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(me))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state,
                        middleware::customer_authorization,
                    )),
            ),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReq {
    /// Username or email.
    pub identifier: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionRes {
    pub token: String,
    pub expires_at: i64,
    pub user: AppUserEntity,
}

#[derive(Serialize, ToSchema)]
pub struct MeRes {
    pub user: AppUserEntity,
    pub wallet: WalletView,
}

const MIN_PASSWORD_LEN: usize = 8;

fn session_cookie(token: &str, max_age: u64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}")
}

fn start_session(
    state: &AppState,
    user: AppUserEntity,
) -> Result<([(header::HeaderName, String); 1], StdResponse<SessionRes, &'static str>), AppError> {
    let role: UserRole = user
        .role
        .parse()
        .map_err(|err: String| anyhow::anyhow!(err))?;
    let ttl = state.config.auth.token_ttl.as_secs();
    let expires_at = Utc::now().timestamp() + ttl as i64;
    let token = auth::issue_token(
        &state.config.auth.secret,
        &AuthUser { id: user.id, role },
        expires_at,
    )
    .context("Failed to sign the session token")?;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, ttl))],
        StdResponse {
            data: Some(SessionRes {
                token,
                expires_at,
                user,
            }),
            message: Some("Signed in successfully"),
        },
    ))
}

/// Create a customer account and sign it in.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    request_body = RegisterReq,
    responses(
        (status = 200, description = "Account created", body = StdResponse<SessionRes, String>),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email taken")
    )
)]
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterReq>,
) -> Result<impl IntoResponse, AppError> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if username.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A username and a valid email are required".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: AppUserEntity = diesel::insert_into(app_users::table)
        .values(CreateAppUserEntity {
            username,
            email,
            password_hash: auth::hash_password(&payload.password)?,
            role: UserRole::Customer.to_string(),
        })
        .returning(AppUserEntity::as_returning())
        .get_result(conn)
        .await?;
    get_or_create_wallet(conn, &state.settings_cache, user.id).await?;

    tracing::info!("Registered user {}", user.username);
    start_session(&state, user)
}

/// Exchange credentials for a session token, also set as a cookie.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Signed in", body = StdResponse<SessionRes, String>),
        (status = 401, description = "Wrong credentials")
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let identifier = payload.identifier.trim();
    let user: Option<AppUserEntity> = app_users::table
        .filter(
            app_users::username
                .eq(identifier)
                .or(app_users::email.eq(identifier.to_lowercase())),
        )
        .select(AppUserEntity::as_select())
        .first(conn)
        .await
        .optional()?;

    match user {
        Some(user) if auth::verify_password(&payload.password, &user.password_hash) => {
            start_session(&state, user)
        }
        _ => Err(AppError::Unauthorized),
    }
}

/// Clear the session cookie.
#[utoipa::path(
    post,
    path = "/logout",
    tags = ["Auth"],
    responses(
        (status = 200, description = "Signed out", body = StdResponse<String, String>)
    )
)]
async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, session_cookie("", 0))],
        StdResponse::<(), &str> {
            data: None,
            message: Some("Signed out"),
        },
    )
}

/// The signed-in user with their wallet.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = StdResponse<MeRes, String>),
        (status = 401, description = "Not signed in")
    )
)]
async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account: AppUserEntity = app_users::table
        .find(user.id)
        .select(AppUserEntity::as_select())
        .first(conn)
        .await?;
    let wallet = wallet_view(conn, &state.settings_cache, user.id).await?;

    Ok(StdResponse {
        data: Some(MeRes {
            user: account,
            wallet,
        }),
        message: Some("Get current user successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc", 60);
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("Max-Age=60"));
    }
}
