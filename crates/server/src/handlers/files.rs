//! Artifact deletion handlers for the main backend.
//!
//! These endpoints are internal: they require the shared
//! `X-Internal-API-Key`. Removing a tree that does not exist counts as a
//! successful deletion.

use crate::auth::require_internal_key;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::{Value, json};
use std::path::Path as FsPath;
use tokio::fs;

/// DELETE /files/{lesson_id} - Remove all artifacts for a lesson.
#[tracing::instrument(skip(state, headers), fields(lesson_id = %lesson_id))]
pub async fn delete_lesson_files(
    State(state): State<AppState>,
    Path(lesson_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_internal_key(&state, &headers)?;

    let video_dir = state.layout.video_dir(&lesson_id).map_err(bad_path)?;
    let materials_dir = state
        .layout
        .lesson_materials_dir(&lesson_id)
        .map_err(bad_path)?;

    let video_deleted = remove_tree(&video_dir).await;
    let materials_deleted = remove_tree(&materials_dir).await;

    tracing::info!(lesson_id = %lesson_id, video_deleted, materials_deleted, "deleted lesson files");

    Ok(Json(json!({
        "message": "lesson files deleted",
        "lesson_id": lesson_id,
        "video_deleted": video_deleted,
        "materials_deleted": materials_deleted,
    })))
}

/// DELETE /files/{lesson_id}/video - Remove only the lesson video.
#[tracing::instrument(skip(state, headers), fields(lesson_id = %lesson_id))]
pub async fn delete_lesson_video(
    State(state): State<AppState>,
    Path(lesson_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_internal_key(&state, &headers)?;

    let video_dir = state.layout.video_dir(&lesson_id).map_err(bad_path)?;
    let deleted = remove_tree(&video_dir).await;

    Ok(Json(json!({
        "message": "lesson video deleted",
        "lesson_id": lesson_id,
        "deleted": deleted,
    })))
}

/// DELETE /files/{lesson_id}/materials/{material_id} - Remove one material.
#[tracing::instrument(skip(state, headers), fields(lesson_id = %lesson_id, material_id = %material_id))]
pub async fn delete_lesson_material(
    State(state): State<AppState>,
    Path((lesson_id, material_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_internal_key(&state, &headers)?;

    let material_dir = state
        .layout
        .material_dir(&lesson_id, &material_id)
        .map_err(bad_path)?;
    let deleted = remove_tree(&material_dir).await;

    Ok(Json(json!({
        "message": "lesson material deleted",
        "lesson_id": lesson_id,
        "material_id": material_id,
        "deleted": deleted,
    })))
}

/// Remove a directory tree; absent trees count as deleted.
async fn remove_tree(path: &FsPath) -> bool {
    match fs::remove_dir_all(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete directory");
            false
        }
    }
}

fn bad_path(e: lectern_core::Error) -> ApiError {
    ApiError::BadRequest(e.to_string())
}
