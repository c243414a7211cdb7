//! Completion notifications to the upstream application.
//!
//! After a successful publish the merge pipeline notifies the main
//! backend that the artifact is ready. A notification failure is logged
//! and never fails the session: the artifact is already published and
//! queryable.

use async_trait::async_trait;
use lectern_core::config::UpstreamConfig;
use lectern_core::upload::{MaterialReadyNotification, VideoReadyNotification};

/// Errors from the completion collaborator.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to reach upstream: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// The upstream application receiving completion notifications.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn video_ready(&self, payload: VideoReadyNotification) -> Result<(), NotifyError>;
    async fn material_ready(&self, payload: MaterialReadyNotification) -> Result<(), NotifyError>;
}

/// HTTP implementation posting to the main backend's internal endpoints.
pub struct HttpNotifier {
    http: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    /// Build a notifier from upstream configuration.
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

    async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<(), NotifyError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionNotifier for HttpNotifier {
    async fn video_ready(&self, payload: VideoReadyNotification) -> Result<(), NotifyError> {
        self.post_json("/internal/storage/video-ready", &payload).await
    }

    async fn material_ready(&self, payload: MaterialReadyNotification) -> Result<(), NotifyError> {
        self.post_json("/internal/storage/file-ready", &payload).await
    }
}
