use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::homeserver::HomeserverError;

/// Error taxonomy of the resource boundary. Every variant maps onto the
/// `{error, errcode}` JSON body shape plus an HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Token not found")]
    NotFound,
    #[error("Permission denied")]
    Forbidden,
    #[error("Token already redeemed")]
    AlreadyRedeemed,
    #[error("Can't redeem your own token")]
    CantRedeemOwnToken,
    #[error("unsupported object type '{0}'")]
    NotSupported(String),
    #[error("Missing required parameter '{0}'")]
    MissingParam(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("Missing or invalid access token")]
    Unauthorized,
    #[error("Guest access is not allowed")]
    GuestAccess,
    #[error("homeserver call failed: {0}")]
    Homeserver(#[from] HomeserverError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status_and_errcode(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::AlreadyRedeemed => (StatusCode::BAD_REQUEST, "ALREADY_REDEEMED"),
            ApiError::CantRedeemOwnToken => (StatusCode::BAD_REQUEST, "CANT_REDEEM"),
            ApiError::NotSupported(_) => (StatusCode::FORBIDDEN, "NOT_SUPPORTED"),
            ApiError::MissingParam(_) => (StatusCode::BAD_REQUEST, "MISSING_PARAM"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::GuestAccess => (StatusCode::FORBIDDEN, "GUEST_ACCESS_FORBIDDEN"),
            ApiError::Homeserver(_)
            | ApiError::Database(_)
            | ApiError::Template(_)
            | ApiError::Qr(_)
            | ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errcode) = self.status_and_errcode();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let body = json!({ "error": self.to_string(), "errcode": errcode });
        (status, Json(body)).into_response()
    }
}
