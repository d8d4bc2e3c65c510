pub mod models;
pub mod review;

// Re-exports
pub use models::*;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub async fn health_handler(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let store = state.review_store.clone();
    let total_reviews = tokio::task::spawn_blocking(move || store.count())
        .await
        .ok()
        .and_then(|count| count.ok())
        .unwrap_or(0);

    Json(models::HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        total_reviews,
    })
}

/// Full HTTP surface of the service
pub fn router(state: AppState, cors: bool) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .merge(review::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
