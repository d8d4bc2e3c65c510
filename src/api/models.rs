use crate::storage::{Review, ReviewStore, StorageError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub review_store: Arc<ReviewStore>,
}

/// Request to add a new review. Absent fields are stored as null.
#[derive(Debug, Default, Deserialize)]
pub struct CreateReviewRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response after adding a review
#[derive(Debug, Serialize)]
pub struct CreateReviewResponse {
    pub id: i64,
    pub name: Option<String>,
    pub message: Option<String>,
}

impl From<Review> for CreateReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            name: review.name,
            message: review.message,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub total_reviews: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Storage task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
