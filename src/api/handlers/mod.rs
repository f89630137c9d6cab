pub mod health;
pub mod upload;

use crate::api::error::AppError;

pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
