use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source adapter error: {0}")]
    Adapter(String),

    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Invalid job transition: job {0} is {1}")]
    JobTransition(i64, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::ReleaseNotFound(_) | AppError::JobNotFound(_) => StatusCode::NOT_FOUND,
            AppError::JobTransition(_, _) => StatusCode::CONFLICT,
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
