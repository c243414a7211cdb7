//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Fixed part size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Maximum concurrent non-terminal upload sessions.
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: u32,
    /// Number of async file writer workers.
    #[serde(default = "default_write_workers")]
    pub write_workers: usize,
    /// Write queue depth before the ingress path falls back to
    /// synchronous writes.
    #[serde(default = "default_write_queue_depth")]
    pub write_queue_depth: usize,
    /// Number of merge workers.
    #[serde(default = "default_merge_workers")]
    pub merge_workers: usize,
    /// Merge queue depth.
    #[serde(default = "default_merge_queue_depth")]
    pub merge_queue_depth: usize,
    /// Capacity of pooled ingress read buffers, in bytes.
    #[serde(default = "default_upload_buffer_size")]
    pub upload_buffer_size: usize,
    /// Copy buffer size used while assembling parts, in bytes.
    #[serde(default = "default_merge_buffer_size")]
    pub merge_buffer_size: usize,
    /// Seconds to keep `tmp/<upload-id>/` around after publish.
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,
    /// Issue fsync on part writes and merged artifacts. Off by default:
    /// the service trades crash-durability of in-flight uploads for
    /// ingestion throughput.
    #[serde(default)]
    pub fsync: bool,
}

impl ServerConfig {
    /// Grace delay before removing a finished upload's staging directory.
    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_concurrent_uploads() -> u32 {
    50
}

fn default_write_workers() -> usize {
    30
}

fn default_write_queue_depth() -> usize {
    500
}

fn default_merge_workers() -> usize {
    5
}

fn default_merge_queue_depth() -> usize {
    100
}

fn default_upload_buffer_size() -> usize {
    64 * 1024 * 1024
}

fn default_merge_buffer_size() -> usize {
    64 * 1024 * 1024
}

fn default_cleanup_grace_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            chunk_size: default_chunk_size(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            write_workers: default_write_workers(),
            write_queue_depth: default_write_queue_depth(),
            merge_workers: default_merge_workers(),
            merge_queue_depth: default_merge_queue_depth(),
            upload_buffer_size: default_upload_buffer_size(),
            merge_buffer_size: default_merge_buffer_size(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
            fsync: false,
        }
    }
}

/// Storage layout configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory holding `tmp/`, `videos/` and `materials/`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Upstream application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the main backend receiving completion notifications.
    #[serde(default = "default_main_backend_url")]
    pub main_backend_url: String,
    /// Public base URL the static front-end serves artifacts from.
    /// Used to construct the URLs embedded in notifications.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Timeout for notification and access-verification calls.
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    /// Shared key for internal backend-to-backend calls (delete surface).
    #[serde(default = "default_internal_api_key")]
    pub internal_api_key: String,
    /// Ask the main backend to verify lesson access before accepting an
    /// init request. Off by default.
    #[serde(default)]
    pub verify_lesson_access: bool,
}

impl UpstreamConfig {
    /// Timeout for outbound collaborator calls.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Public base with any trailing slash trimmed.
    pub fn public_base(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }
}

fn default_main_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_internal_api_key() -> String {
    "change-this-to-a-secure-random-key-in-production".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            main_backend_url: default_main_backend_url(),
            public_base_url: default_public_base_url(),
            notify_timeout_secs: default_notify_timeout_secs(),
            internal_api_key: default_internal_api_key(),
            verify_lesson_access: false,
        }
    }
}

/// Media probing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Path to the ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage layout configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upstream application configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Media probing configuration.
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl AppConfig {
    /// Create a test configuration with small tunables.
    ///
    /// **For testing only.** Uses a tiny part size so tests exercise
    /// multi-part flows with kilobyte payloads.
    pub fn for_testing(base_dir: PathBuf) -> Self {
        Self {
            server: ServerConfig {
                chunk_size: 1024,
                write_workers: 2,
                write_queue_depth: 8,
                merge_workers: 1,
                merge_queue_depth: 8,
                upload_buffer_size: 4096,
                merge_buffer_size: 4096,
                cleanup_grace_secs: 60,
                ..Default::default()
            },
            storage: StorageConfig { base_dir },
            upstream: UpstreamConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}
