//! Request credential extraction.
//!
//! Two credentials guard the surface: the per-session upload token
//! (`X-Upload-Token`) on the part/complete/list endpoints, and the shared
//! internal API key (`X-Internal-API-Key`) on the delete surface. Both are
//! compared by SHA-256 fingerprint, never byte-by-byte against the secret.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::http::HeaderMap;
use lectern_core::token::TokenFingerprint;

/// Header carrying the per-session upload token.
pub const UPLOAD_TOKEN_HEADER: &str = "x-upload-token";

/// Header carrying the internal backend-to-backend key.
pub const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";

/// Header carrying the end-user bearer credential for lesson-access checks.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Extract the upload token or fail with 401.
pub fn require_upload_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(UPLOAD_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing upload token".to_string()))
}

/// Verify the internal API key or fail with 401.
pub fn require_internal_key(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let presented = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let expected = TokenFingerprint::of(&state.config.upstream.internal_api_key);
    if expected.matches(presented) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("unauthorized".to_string()))
    }
}

/// Extract a bearer credential from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}
