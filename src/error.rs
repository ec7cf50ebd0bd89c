use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Chain ID {0} is not supported")]
    UnsupportedChain(String),

    #[error("Explorer fetch failed: {0}")]
    Fetch(String),

    #[error("Malformed transfer {hash}: {reason}")]
    MalformedTransfer { hash: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn malformed(hash: &str, reason: impl Into<String>) -> Self {
        AppError::MalformedTransfer {
            hash: hash.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the next scheduled run can be expected to succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Fetch(_) | AppError::Persistence(_))
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::UnsupportedChain(_) => "UNSUPPORTED_CHAIN",
            AppError::Fetch(_) => "FETCH_ERROR",
            AppError::MalformedTransfer { .. } => "MALFORMED_TRANSFER",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedChain(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            AppError::MalformedTransfer { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Fetch(err.to_string())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
