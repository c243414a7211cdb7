//! Upload ingress handlers.

use crate::access::AccessError;
use crate::auth::{extract_bearer_token, require_upload_token};
use crate::error::{ApiError, ApiResult};
use crate::merge::MergeJob;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures::StreamExt;
use lectern_core::PART_SIZE_SLACK;
use lectern_core::upload::{
    CompleteUploadResponse, InitUploadRequest, InitUploadResponse, PartListResponse, UploadId,
    UploadKind, UploadStatusResponse,
};

/// POST /uploads/videos - Init a video upload.
#[tracing::instrument(skip(state, headers, req), fields(lesson_id = %req.lesson_id))]
pub async fn init_video_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitUploadRequest>,
) -> ApiResult<Json<InitUploadResponse>> {
    let content_type = req
        .content_type
        .clone()
        .unwrap_or_else(|| UploadKind::Video.default_content_type().to_string());
    if content_type != "video/mp4" {
        return Err(ApiError::BadRequest(
            "only video/mp4 is supported".to_string(),
        ));
    }

    init_upload(&state, &headers, req, UploadKind::Video, content_type).await
}

/// POST /uploads/files - Init a material upload. Any content type is
/// accepted; the store serves whatever the user uploads.
#[tracing::instrument(skip(state, headers, req), fields(lesson_id = %req.lesson_id))]
pub async fn init_material_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitUploadRequest>,
) -> ApiResult<Json<InitUploadResponse>> {
    let content_type = req
        .content_type
        .clone()
        .unwrap_or_else(|| UploadKind::Material.default_content_type().to_string());

    init_upload(&state, &headers, req, UploadKind::Material, content_type).await
}

async fn init_upload(
    state: &AppState,
    headers: &HeaderMap,
    req: InitUploadRequest,
    kind: UploadKind,
    content_type: String,
) -> ApiResult<Json<InitUploadResponse>> {
    if let Some(verifier) = &state.access {
        let bearer = extract_bearer_token(headers)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer credential".to_string()))?;
        verifier
            .verify(bearer, &req.lesson_id)
            .await
            .map_err(|e| match e {
                AccessError::Denied(msg) => ApiError::Unauthorized(msg),
                AccessError::Upstream(msg) => ApiError::Internal(msg),
            })?;
    }

    let (snapshot, token) = state.registry.create_session(&req, kind, content_type).await?;

    Ok(Json(InitUploadResponse {
        upload_id: snapshot.id.to_string(),
        upload_token: token.reveal().to_string(),
        chunk_size: state.config.server.chunk_size,
        put_url: format!("/uploads/{}/parts/{{n}}", snapshot.id),
    }))
}

/// PUT /uploads/{upload_id}/parts/{n} - Receive one raw-bytes part.
///
/// The token is checked before the body is read; the body is accumulated
/// into a pooled buffer and handed to the writer pool as a fresh
/// allocation so the buffer can be reclaimed immediately.
#[tracing::instrument(skip(state, req), fields(upload_id = %upload_id, part = part_num))]
pub async fn upload_part(
    State(state): State<AppState>,
    Path((upload_id, part_num)): Path<(String, u32)>,
    req: Request,
) -> ApiResult<StatusCode> {
    let id = parse_upload_id(&upload_id)?;
    if part_num < 1 {
        return Err(ApiError::BadRequest("invalid part number".to_string()));
    }

    let token = require_upload_token(req.headers())?.to_string();
    state.registry.validate_token(id, &token).await?;

    let max_part_size = (state.config.server.chunk_size + PART_SIZE_SLACK) as usize;
    let mut buf = state.buffers.acquire();
    let mut stream = req.into_body().into_data_stream();
    while let Some(frame) = stream.next().await {
        let frame = frame
            .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {e}")))?;
        if buf.len() + frame.len() > max_part_size {
            return Err(ApiError::BadRequest(format!(
                "part exceeds maximum size {max_part_size}"
            )));
        }
        buf.extend_from_slice(&frame);
    }

    let bytes = Bytes::copy_from_slice(&buf);
    drop(buf);

    state.registry.save_part(id, part_num, bytes).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /uploads/{upload_id}/parts - List received parts for resumption.
#[tracing::instrument(skip(state, headers), fields(upload_id = %upload_id))]
pub async fn list_parts(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<PartListResponse>> {
    let id = parse_upload_id(&upload_id)?;
    let token = require_upload_token(&headers)?;
    state.registry.validate_token(id, token).await?;

    Ok(Json(state.registry.list_parts(id).await?))
}

/// POST /uploads/{upload_id}/complete - Verify all parts and enqueue the
/// merge. Responds 202; the merge happens in the background.
#[tracing::instrument(skip(state, headers), fields(upload_id = %upload_id))]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<CompleteUploadResponse>)> {
    let id = parse_upload_id(&upload_id)?;
    let token = require_upload_token(&headers)?;
    state.registry.validate_token(id, token).await?;

    let snapshot = state.registry.mark_complete(id).await?;
    state
        .merge_queue
        .enqueue(MergeJob {
            upload_id: id,
            session: snapshot,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CompleteUploadResponse {
            status: "processing".to_string(),
        }),
    ))
}

/// GET /uploads/{upload_id}/status - Progress and terminal status.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStatusResponse>> {
    let id = parse_upload_id(&upload_id)?;
    let snapshot = state
        .registry
        .snapshot(id)
        .await
        .map_err(|_| ApiError::NotFound("upload not found".to_string()))?;

    Ok(Json(UploadStatusResponse {
        upload_id: snapshot.id.to_string(),
        status: snapshot.status,
        received_bytes: snapshot.received_bytes,
        expected_bytes: snapshot.expected_size,
        progress: snapshot.progress(),
        error: snapshot.error,
    }))
}

fn parse_upload_id(raw: &str) -> ApiResult<UploadId> {
    UploadId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}
