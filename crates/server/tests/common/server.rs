//! Server test utilities.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use lectern_core::config::AppConfig;
use lectern_core::upload::{MaterialReadyNotification, VideoReadyNotification};
use lectern_server::notify::{CompletionNotifier, NotifyError};
use lectern_server::probe::{DurationProber, ProbeError};
use lectern_server::{AppState, create_router};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Duration the stub prober reports for every video.
#[allow(dead_code)]
pub const STUB_DURATION_SECS: u32 = 42;

/// A completion notification captured by the recording notifier.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub enum Recorded {
    Video(VideoReadyNotification),
    Material(MaterialReadyNotification),
}

/// Notifier that records payloads instead of calling upstream.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Recorded>>>,
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn video_ready(&self, payload: VideoReadyNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Recorded::Video(payload));
        Ok(())
    }

    async fn material_ready(&self, payload: MaterialReadyNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Recorded::Material(payload));
        Ok(())
    }
}

/// Prober that reports a fixed duration without running ffprobe.
pub struct StubProber;

#[async_trait]
impl DurationProber for StubProber {
    async fn duration_seconds(&self, _path: &Path) -> Result<u32, ProbeError> {
        Ok(STUB_DURATION_SECS)
    }
}

/// A test server wrapper with all dependencies on a temp directory.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    notifications: RecordingNotifier,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with small part sizes (1 KiB chunks).
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with config modifications on top of the test
    /// defaults.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp_dir.path().to_path_buf());
        modifier(&mut config);

        for sub in ["tmp", "videos", "materials"] {
            std::fs::create_dir_all(temp_dir.path().join(sub))
                .expect("Failed to create store directory");
        }

        let notifications = RecordingNotifier::default();
        let state = AppState::new(
            config,
            Arc::new(notifications.clone()),
            Arc::new(StubProber),
            None,
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            notifications,
            temp_dir,
        }
    }

    /// Base directory holding tmp/, videos/ and materials/.
    pub fn base_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Notifications captured so far.
    pub fn notifications(&self) -> Vec<Recorded> {
        self.notifications.sent.lock().unwrap().clone()
    }

    /// Poll until at least `count` notifications have been recorded.
    /// Notification happens after the session turns ready, so tests that
    /// assert payloads must wait for it separately.
    pub async fn wait_for_notifications(&self, count: usize) -> Vec<Recorded> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let recorded = self.notifications();
            if recorded.len() >= count {
                return recorded;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("expected {count} notifications, got {}", recorded.len());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Part size the server hands out at init.
    pub fn chunk_size(&self) -> u64 {
        self.state.config.server.chunk_size
    }

    /// Issue a JSON request and decode the JSON response (if any).
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let request = builder.body(body).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Init a video upload, returning (upload_id, upload_token).
    pub async fn init_video(&self, lesson_id: &str, size: u64) -> (String, String) {
        let (status, body) = self
            .json_request(
                "POST",
                "/uploads/videos",
                Some(serde_json::json!({
                    "lesson_id": lesson_id,
                    "filename": "lecture.mp4",
                    "size": size,
                })),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK, "init failed: {body}");
        (
            body["upload_id"].as_str().unwrap().to_string(),
            body["upload_token"].as_str().unwrap().to_string(),
        )
    }

    /// Upload one raw part.
    pub async fn put_part(
        &self,
        upload_id: &str,
        part_num: u32,
        token: &str,
        bytes: Vec<u8>,
    ) -> StatusCode {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/uploads/{upload_id}/parts/{part_num}"))
            .header("X-Upload-Token", token)
            .body(Body::from(bytes))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap().status()
    }

    /// POST complete for an upload.
    pub async fn complete(&self, upload_id: &str, token: &str) -> (StatusCode, Value) {
        self.json_request(
            "POST",
            &format!("/uploads/{upload_id}/complete"),
            None,
            &[("X-Upload-Token", token)],
        )
        .await
    }

    /// Poll the status endpoint until the session reaches a terminal state.
    pub async fn wait_for_terminal(&self, upload_id: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (status, body) = self
                .json_request("GET", &format!("/uploads/{upload_id}/status"), None, &[])
                .await;
            assert_eq!(status, StatusCode::OK);
            match body["status"].as_str() {
                Some("ready") | Some("failed") => return body,
                _ => {}
            }
            if tokio::time::Instant::now() > deadline {
                panic!("upload {upload_id} did not settle in time: {body}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Deterministic part payload: `part_num` repeated across a full chunk.
#[allow(dead_code)]
pub fn part_bytes(part_num: u32, len: usize) -> Vec<u8> {
    vec![part_num as u8; len]
}
