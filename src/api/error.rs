use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    TransportLimit { code: &'static str, message: String },

    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },

    #[error("Not authorized to perform this action")]
    Forbidden,

    #[error("{0}")]
    TooManyRequests(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Rejections raised while reading the multipart stream, before validation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("File size exceeds the {limit} limit")]
    FileTooLarge { limit: String },

    #[error("Too many files uploaded")]
    TooManyFiles,

    #[error("Unexpected file field")]
    UnexpectedFile,

    #[error("Too many parts in the form data")]
    TooManyParts,

    #[error("Request body exceeds the {limit} limit")]
    BodyTooLarge { limit: String },

    #[error("Upload error: {0}")]
    Malformed(String),

    #[error("Failed to stage upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::FileTooLarge { .. } => "LIMIT_FILE_SIZE",
            TransportError::TooManyFiles => "LIMIT_FILE_COUNT",
            TransportError::UnexpectedFile => "LIMIT_UNEXPECTED_FILE",
            TransportError::TooManyParts => "LIMIT_PART_COUNT",
            TransportError::BodyTooLarge { .. } => "LIMIT_BODY_SIZE",
            TransportError::Malformed(_) => "MALFORMED_MULTIPART",
            TransportError::Storage(_) => "STAGING_FAILED",
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        match err {
            // Local disk trouble is ours, not the client's.
            TransportError::Storage(e) => {
                AppError::Anyhow(anyhow::Error::new(e).context("Failed to stage upload"))
            }
            other => AppError::TransportLimit {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

impl AppError {
    /// Message safe to show any client, with internal detail withheld.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Anyhow(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Detail of an internal failure, attached to the response for the
/// error-details layer to expose outside production.
#[derive(Debug, Clone)]
pub struct ErrorReport(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body, report) = match self {
            AppError::TransportLimit { code, message } => {
                tracing::warn!("Upload rejected ({}): {}", code, message);
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "success": false, "message": message, "code": code }),
                    None,
                )
            }
            AppError::Validation {
                code,
                message,
                details,
            } => {
                tracing::warn!("Validation failed ({}): {}", code, message);
                let mut body = json!({ "success": false, "message": message, "code": code });
                if let Some(details) = details {
                    body["details"] = details;
                }
                (StatusCode::BAD_REQUEST, body, None)
            }
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "message": AppError::Forbidden.to_string() }),
                None,
            ),
            AppError::TooManyRequests(message) => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "success": false, "message": message }),
                None,
            ),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": message }),
                None,
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_body(Value::Null),
                    Some(msg),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_body(Value::Null),
                    Some(format!("{:#}", e)),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = report {
            response.extensions_mut().insert(ErrorReport(detail));
        }
        response
    }
}

pub fn internal_body(error: Value) -> Value {
    json!({
        "success": false,
        "message": INTERNAL_ERROR_MESSAGE,
        "error": error,
    })
}
