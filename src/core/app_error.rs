use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use diesel::result::DatabaseErrorKind;
use serde::Serialize;
use utoipa::ToSchema;

use super::aliases::DieselError;

/// Shared response envelope. Every endpoint answers with `{ data, message }`.
#[derive(Serialize, ToSchema, Debug)]
pub struct StdResponse<T, M> {
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Resource not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("You are not allowed to access this resource")]
    ForbiddenResource,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("{0} is unreachable")]
    ServiceUnreachable(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::ForbiddenResource => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnreachable(_) | AppError::PaymentGateway(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AppError::Conflict(info.message().to_string())
            }
            other => AppError::Other(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Other(err) => {
                tracing::error!("Internal error: {:?}", err);
                "Internal server error".to_string()
            }
            other => {
                tracing::debug!("Request failed with {}: {}", status, other);
                other.to_string()
            }
        };

        let body = StdResponse::<(), String> {
            data: None,
            message: Some(message),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::BadRequest("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidSignature.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::PaymentGateway("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn diesel_not_found_becomes_404() {
        let err: AppError = DieselError::NotFound.into();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = AppError::Other(anyhow::anyhow!("db password leaked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
