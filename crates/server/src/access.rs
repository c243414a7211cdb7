//! Pluggable lesson-access verification.
//!
//! The main backend can verify that a bearer credential grants access to a
//! lesson before an upload session is created. The collaborator exists as
//! a contract; it is only invoked when `upstream.verify_lesson_access` is
//! enabled in configuration.

use async_trait::async_trait;
use lectern_core::config::UpstreamConfig;
use serde_json::json;

/// Errors from the access verifier.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("access denied: {0}")]
    Denied(String),

    #[error("access check failed: {0}")]
    Upstream(String),
}

/// Verifies that a bearer credential may touch a lesson.
#[async_trait]
pub trait LessonAccessVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str, lesson_id: &str) -> Result<(), AccessError>;
}

/// HTTP implementation calling the main backend's internal verifier.
pub struct HttpAccessVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccessVerifier {
    pub fn new(config: &UpstreamConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.notify_timeout())
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.main_backend_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LessonAccessVerifier for HttpAccessVerifier {
    async fn verify(&self, bearer_token: &str, lesson_id: &str) -> Result<(), AccessError> {
        let url = format!("{}/internal/auth/verify-lesson-access", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(bearer_token)
            .json(&json!({ "lesson_id": lesson_id }))
            .send()
            .await
            .map_err(|e| AccessError::Upstream(e.to_string()))?;

        match response.status().as_u16() {
            200 => Ok(()),
            401 => Err(AccessError::Denied("authentication failed".to_string())),
            403 => Err(AccessError::Denied(
                "user does not have access to this lesson".to_string(),
            )),
            404 => Err(AccessError::Denied("lesson not found".to_string())),
            status => Err(AccessError::Upstream(format!(
                "auth check failed with status {status}"
            ))),
        }
    }
}
