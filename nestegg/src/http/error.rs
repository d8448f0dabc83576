use std::time::Duration;

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::Json;
use axum_extra::extract::FormRejection;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::notes::NoteError;
use crate::rate_limit::RateLimited;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Admin access required")]
    AdminOnly,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Too many requests, slow down!")]
    RateLimited { retry_after: Duration },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Notes(#[from] NoteError),
    #[error("Internal server error")]
    Internal,
}

impl From<RateLimited> for ApiError {
    fn from(limited: RateLimited) -> Self {
        ApiError::RateLimited {
            retry_after: limited.retry_after,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotLoggedIn | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AdminOnly => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Ledger(err) => match err {
                LedgerError::InvalidContribution { .. }
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::InvalidWithdrawal { .. }
                | LedgerError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
                LedgerError::ResetAlreadyUsed => StatusCode::FORBIDDEN,
                LedgerError::Busy => StatusCode::TOO_MANY_REQUESTS,
            },
            ApiError::Notes(err) => match err {
                NoteError::MissingTitle | NoteError::TitleTooLong | NoteError::ContentTooLong => {
                    StatusCode::BAD_REQUEST
                }
                NoteError::NotFound { .. } => StatusCode::NOT_FOUND,
                NoteError::NotOwner { .. } => StatusCode::FORBIDDEN,
            },
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Ledger rejections are reported under `message`, like ledger successes.
    fn body_key(&self) -> &'static str {
        match self {
            ApiError::Ledger(_) => "message",
            _ => "error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::Map::new();
        body.insert(
            String::from(self.body_key()),
            serde_json::Value::String(self.to_string()),
        );
        let mut response = (self.status(), Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds.max(1)));
        }
        response
    }
}
