use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use super::{
    app_error::AppError,
    app_state::AppState,
    auth::{self, AuthUser, SESSION_COOKIE},
};

/// Reads the session token from `Authorization: Bearer` or the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = extract_token(headers).ok_or(AppError::Unauthorized)?;
    auth::verify_token(&state.config.auth.secret, &token, Utc::now().timestamp()).map_err(
        |err| {
            tracing::debug!("Rejected session token: {}", err);
            AppError::Unauthorized
        },
    )
}

/// Any signed-in user.
pub async fn customer_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers())?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Staff only: `admin` or `super_admin`.
pub async fn admin_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers())?;
    if !user.role.is_staff() {
        return Err(AppError::ForbiddenResource);
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn prefers_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=def"));
        assert_eq!(extract_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn falls_back_to_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=def; other=1"),
        );
        assert_eq!(extract_token(&headers), Some("def".to_string()));
    }

    #[test]
    fn no_credentials_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_token(&headers), None);
    }
}
