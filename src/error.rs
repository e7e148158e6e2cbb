use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid drive order: {0}, supported orders are 0 (in-out) and 1 (out-in)")]
    InvalidDriveOrder(i64),
    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Busy: {0}")]
    Busy(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("GPIO error: {0}")]
    Gpio(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidDriveOrder(_)
            | AppError::UnexpectedArgument(_)
            | AppError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            AppError::Busy(_) => StatusCode::CONFLICT,
            AppError::InvalidConfiguration(_)
            | AppError::InvalidState(_)
            | AppError::Config(_)
            | AppError::Gpio(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
