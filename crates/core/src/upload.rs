//! Upload session types and lifecycle.

use crate::token::TokenFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidUpload(format!("invalid upload ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of artifact an upload produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    /// A lesson video, published as `videos/<lesson>/video.mp4`.
    Video,
    /// A lesson material, published as `materials/<lesson>/<material>/<filename>`.
    Material,
}

impl UploadKind {
    /// Default content type for this kind when the client supplies none.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Material => "application/octet-stream",
        }
    }
}

/// Upload session status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Session created, no parts received yet.
    Initiated,
    /// At least one part received.
    Receiving,
    /// All parts received, complete acknowledged.
    Uploaded,
    /// A merge worker is assembling the artifact.
    Merging,
    /// Artifact published and visible at its final path.
    Ready,
    /// Unrecoverable error; details in the session error field.
    Failed,
}

impl UploadStatus {
    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Legal moves: `Initiated -> Receiving -> Uploaded -> Merging`,
    /// `Merging -> Ready | Failed`, and any non-terminal state to `Failed`.
    pub fn can_transition_to(&self, to: UploadStatus) -> bool {
        if *self == to {
            return false;
        }
        match to {
            UploadStatus::Initiated => false,
            UploadStatus::Receiving => *self == UploadStatus::Initiated,
            UploadStatus::Uploaded => {
                matches!(self, UploadStatus::Initiated | UploadStatus::Receiving)
            }
            UploadStatus::Merging => *self == UploadStatus::Uploaded,
            UploadStatus::Ready => *self == UploadStatus::Merging,
            UploadStatus::Failed => !self.is_terminal(),
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "initiated",
            Self::Receiving => "receiving",
            Self::Uploaded => "uploaded",
            Self::Merging => "merging",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An upload session tracking resumable upload state.
///
/// Mutable fields are guarded by the registry's per-session lock; this type
/// itself is lock-free data.
#[derive(Debug)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadId,
    /// Artifact kind.
    pub kind: UploadKind,
    /// Owning lesson.
    pub lesson_id: String,
    /// Material identifier; generated at merge time when absent.
    pub material_id: Option<String>,
    /// Client-supplied filename (extension and material path).
    pub filename: String,
    /// Content type reported at init.
    pub content_type: String,
    /// Expected total size in bytes.
    pub expected_size: u64,
    /// Part size for this session.
    pub chunk_size: u64,
    /// Number of parts the client must deliver.
    pub total_parts: u32,
    /// Bytes counted across distinct received parts.
    pub received_bytes: u64,
    /// 1-indexed part numbers received so far.
    pub parts_received: HashSet<u32>,
    /// Fingerprint of the session's upload token.
    pub token: TokenFingerprint,
    /// Current lifecycle status.
    pub status: UploadStatus,
    /// Whether this session still counts against the admission cap.
    pub holds_admission: bool,
    /// When the session was created.
    pub created_at: OffsetDateTime,
    /// Set on entry to a terminal state.
    pub completed_at: Option<OffsetDateTime>,
    /// Human-readable failure detail.
    pub error: Option<String>,
    /// Final publish path, set during merge.
    pub output_path: Option<PathBuf>,
}

impl UploadSession {
    /// Create a new session in `Initiated`, holding an admission slot.
    pub fn new(
        kind: UploadKind,
        lesson_id: String,
        material_id: Option<String>,
        filename: String,
        content_type: String,
        expected_size: u64,
        chunk_size: u64,
        token: TokenFingerprint,
    ) -> Self {
        Self {
            id: UploadId::new(),
            kind,
            lesson_id,
            material_id,
            filename,
            content_type,
            expected_size,
            chunk_size,
            total_parts: total_parts(expected_size, chunk_size),
            received_bytes: 0,
            parts_received: HashSet::new(),
            token,
            status: UploadStatus::Initiated,
            holds_admission: true,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
            error: None,
            output_path: None,
        }
    }

    /// Record receipt of a part. Returns false if the part was already
    /// counted (duplicate delivery), in which case nothing changes.
    pub fn record_part(&mut self, part_num: u32, len: u64) -> bool {
        if !self.parts_received.insert(part_num) {
            return false;
        }
        self.received_bytes += len;
        if self.status == UploadStatus::Initiated {
            self.status = UploadStatus::Receiving;
        }
        true
    }

    /// The smallest part index in `1..=total_parts` not yet received.
    pub fn first_missing_part(&self) -> Option<u32> {
        (1..=self.total_parts).find(|n| !self.parts_received.contains(n))
    }

    /// Drive the session to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, to: UploadStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(crate::Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    /// Immutable copy for safe concurrent reads. Excludes the token
    /// fingerprint and the part bitmap.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            kind: self.kind,
            lesson_id: self.lesson_id.clone(),
            material_id: self.material_id.clone(),
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            expected_size: self.expected_size,
            chunk_size: self.chunk_size,
            total_parts: self.total_parts,
            received_bytes: self.received_bytes,
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
            output_path: self.output_path.clone(),
        }
    }
}

/// Read-only view of a session, safe to hand across task boundaries.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub id: UploadId,
    pub kind: UploadKind,
    pub lesson_id: String,
    pub material_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub expected_size: u64,
    pub chunk_size: u64,
    pub total_parts: u32,
    pub received_bytes: u64,
    pub status: UploadStatus,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl SessionSnapshot {
    /// Upload progress in percent.
    pub fn progress(&self) -> f64 {
        if self.expected_size == 0 {
            return 0.0;
        }
        self.received_bytes as f64 / self.expected_size as f64 * 100.0
    }
}

/// Number of parts needed for `expected_size` at `chunk_size`.
pub fn total_parts(expected_size: u64, chunk_size: u64) -> u32 {
    expected_size.div_ceil(chunk_size) as u32
}

/// Request body for both init endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadRequest {
    /// The lesson this upload belongs to.
    pub lesson_id: String,
    /// Client filename; its extension is preserved on the merged artifact.
    pub filename: String,
    /// Total upload size in bytes.
    pub size: u64,
    /// Optional content type (defaults depend on kind).
    #[serde(default)]
    pub content_type: Option<String>,
    /// Optional material identifier (materials only).
    #[serde(default)]
    pub material_id: Option<String>,
}

/// Response from an init endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadResponse {
    pub upload_id: String,
    pub upload_token: String,
    pub chunk_size: u64,
    /// Template URL for part uploads, with a literal `{n}` placeholder.
    pub put_url: String,
}

/// Response from the complete endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub status: String,
}

/// Response from the status endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub status: UploadStatus,
    pub received_bytes: u64,
    pub expected_bytes: u64,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response from the part listing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartListResponse {
    pub upload_id: String,
    /// Total parts the session expects.
    pub total: u32,
    /// Sorted part numbers confirmed present (bitmap and on disk).
    pub received: Vec<u32>,
    /// How many parts are still missing.
    pub missing: u32,
}

/// Completion notification for a published video.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoReadyNotification {
    pub lesson_id: String,
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u32>,
}

/// Completion notification for a published material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialReadyNotification {
    pub lesson_id: String,
    pub material_id: String,
    pub file_url: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}
