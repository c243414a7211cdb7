//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::http::{HeaderName, Method, header};
use axum::routing::{delete, get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Browser clients upload directly; the token travels in a custom header.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::CONTENT_LENGTH,
            header::RANGE,
            HeaderName::from_static("x-upload-token"),
        ]);

    Router::new()
        // Upload control plane
        .route("/uploads/videos", post(handlers::init_video_upload))
        .route("/uploads/files", post(handlers::init_material_upload))
        .route(
            "/uploads/{upload_id}/parts/{part_num}",
            put(handlers::upload_part),
        )
        .route("/uploads/{upload_id}/parts", get(handlers::list_parts))
        .route(
            "/uploads/{upload_id}/complete",
            post(handlers::complete_upload),
        )
        .route("/uploads/{upload_id}/status", get(handlers::upload_status))
        // Internal delete surface for the main backend
        .route("/files/{lesson_id}", delete(handlers::delete_lesson_files))
        .route(
            "/files/{lesson_id}/video",
            delete(handlers::delete_lesson_video),
        )
        .route(
            "/files/{lesson_id}/materials/{material_id}",
            delete(handlers::delete_lesson_material),
        )
        // Health check (intentionally unauthenticated for probes)
        .route("/health", get(handlers::health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
