use crate::api::models::*;
use crate::storage::Review;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::info;

pub async fn create_review_handler(
    State(state): State<AppState>,
    payload: Result<Option<Json<CreateReviewRequest>>, JsonRejection>,
) -> Result<Json<CreateReviewResponse>, AppError> {
    // Bodies without a JSON content type carry no fields
    let request = match payload.map_err(|e| AppError::BadRequest(e.body_text()))? {
        Some(Json(request)) => request,
        None => CreateReviewRequest::default(),
    };

    let store = state.review_store.clone();
    let review = tokio::task::spawn_blocking(move || {
        store.insert(request.name.as_deref(), request.message.as_deref())
    })
    .await??;

    info!(id = review.id, "Review added");

    Ok(Json(review.into()))
}

pub async fn list_reviews_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Review>>, AppError> {
    let store = state.review_store.clone();
    let reviews = tokio::task::spawn_blocking(move || store.list_all()).await??;

    info!(count = reviews.len(), "Listed reviews");

    Ok(Json(reviews))
}
