//! In-memory session registry.
//!
//! Owns the upload-id to session map, the admission counter, and all
//! session mutation. Sessions are process-local and never removed from the
//! map; terminal records stay queryable until shutdown. Admission is
//! released when a session leaves the ingress-facing states
//! (`Uploaded`, or `Failed` before completion) because the bounded
//! resource is concurrent ingress, not merge capacity.
//!
//! Lock discipline: the admission counter and the session map are separate
//! locks, always taken admission first. Each session record has its own
//! lock; no lock is ever held across file I/O or a blocking channel send.

use crate::writer::WriterPool;
use bytes::Bytes;
use lectern_core::config::ServerConfig;
use lectern_core::layout::{StoreLayout, safe_component};
use lectern_core::token::UploadToken;
use lectern_core::upload::{
    InitUploadRequest, PartListResponse, SessionSnapshot, UploadId, UploadKind, UploadSession,
    UploadStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("upload session not found")]
    NotFound,

    #[error("invalid upload token")]
    Unauthorized,

    #[error("too many concurrent uploads, please retry later")]
    TooManyUploads,

    #[error("missing part {0}")]
    MissingPart(u32),

    #[error("invalid part number {part}: expected 1..={total}")]
    PartOutOfRange { part: u32, total: u32 },

    #[error(transparent)]
    Domain(#[from] lectern_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type SessionHandle = Arc<RwLock<UploadSession>>;

/// The in-memory mapping from upload-id to session record.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UploadId, SessionHandle>>,
    admitted: Mutex<u32>,
    max_concurrent: u32,
    chunk_size: u64,
    layout: StoreLayout,
    writer: Arc<WriterPool>,
}

impl SessionRegistry {
    /// Create a registry for one service instance.
    pub fn new(config: &ServerConfig, layout: StoreLayout, writer: Arc<WriterPool>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            admitted: Mutex::new(0),
            max_concurrent: config.max_concurrent_uploads,
            chunk_size: config.chunk_size,
            layout,
            writer,
        }
    }

    /// Allocate a new session.
    ///
    /// Validation happens before the admission check, so a malformed
    /// request never consumes a slot and an admission reject never creates
    /// a staging directory.
    pub async fn create_session(
        &self,
        req: &InitUploadRequest,
        kind: UploadKind,
        content_type: String,
    ) -> Result<(SessionSnapshot, UploadToken), RegistryError> {
        if req.size == 0 {
            return Err(lectern_core::Error::InvalidUpload("size must be positive".into()).into());
        }
        if req.lesson_id.is_empty() {
            return Err(lectern_core::Error::InvalidUpload("lesson_id is required".into()).into());
        }
        safe_component(&req.lesson_id)?;
        if req.filename.is_empty() {
            return Err(lectern_core::Error::InvalidUpload("filename is required".into()).into());
        }
        safe_component(&req.filename)?;
        if let Some(material_id) = &req.material_id {
            safe_component(material_id)?;
        }

        {
            let mut admitted = self.admitted.lock().await;
            if *admitted >= self.max_concurrent {
                return Err(RegistryError::TooManyUploads);
            }
            *admitted += 1;
        }

        let token = UploadToken::generate();
        let session = UploadSession::new(
            kind,
            req.lesson_id.clone(),
            req.material_id.clone(),
            req.filename.clone(),
            content_type,
            req.size,
            self.chunk_size,
            token.fingerprint(),
        );
        let id = session.id;
        let snapshot = session.snapshot();

        if let Err(e) = fs::create_dir_all(self.layout.parts_dir(id)).await {
            self.release_admission().await;
            return Err(e.into());
        }

        self.sessions
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(session)));

        tracing::info!(
            upload_id = %id,
            lesson_id = %snapshot.lesson_id,
            size = snapshot.expected_size,
            parts = snapshot.total_parts,
            "created upload session"
        );

        Ok((snapshot, token))
    }

    /// Validate the upload token for a session.
    ///
    /// An unknown upload-id and a wrong token are indistinguishable here;
    /// both are an auth failure at this boundary.
    pub async fn validate_token(
        &self,
        id: UploadId,
        presented: &str,
    ) -> Result<(), RegistryError> {
        let handle = self
            .session_handle(id)
            .await
            .ok_or(RegistryError::Unauthorized)?;
        let session = handle.read().await;
        if session.token.matches(presented) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized)
        }
    }

    /// Persist one part through the writer pool and record its receipt.
    ///
    /// Duplicate deliveries of the same part index succeed without
    /// double-counting. The completion handle is awaited with no session
    /// lock held.
    pub async fn save_part(
        &self,
        id: UploadId,
        part_num: u32,
        bytes: Bytes,
    ) -> Result<(), RegistryError> {
        let handle = self.session_handle(id).await.ok_or(RegistryError::NotFound)?;
        let total = handle.read().await.total_parts;
        if part_num < 1 || part_num > total {
            return Err(RegistryError::PartOutOfRange {
                part: part_num,
                total,
            });
        }

        let len = bytes.len() as u64;
        self.writer.save(self.layout.part_path(id, part_num), bytes).await?;

        let mut session = handle.write().await;
        if session.record_part(part_num, len)
            && (part_num % 10 == 0 || part_num == session.total_parts)
        {
            tracing::debug!(
                upload_id = %id,
                part = part_num,
                total = session.total_parts,
                received_bytes = session.received_bytes,
                "part received"
            );
        }
        Ok(())
    }

    /// List parts confirmed received: present in the bitmap AND on disk.
    /// The disk cross-check guards against silently dropped writes.
    pub async fn list_parts(&self, id: UploadId) -> Result<PartListResponse, RegistryError> {
        let handle = self.session_handle(id).await.ok_or(RegistryError::NotFound)?;
        let (total, bitmap) = {
            let session = handle.read().await;
            let bitmap: Vec<u32> = session.parts_received.iter().copied().collect();
            (session.total_parts, bitmap)
        };

        let mut received = Vec::with_capacity(bitmap.len());
        for part in bitmap {
            if fs::try_exists(self.layout.part_path(id, part))
                .await
                .unwrap_or(false)
            {
                received.push(part);
            }
        }
        received.sort_unstable();

        Ok(PartListResponse {
            upload_id: id.to_string(),
            total,
            missing: total - received.len() as u32,
            received,
        })
    }

    /// Verify the bitmap is complete and transition to `Uploaded`,
    /// releasing the admission slot. On an incomplete bitmap the smallest
    /// missing index is reported and nothing is mutated.
    pub async fn mark_complete(&self, id: UploadId) -> Result<SessionSnapshot, RegistryError> {
        let handle = self.session_handle(id).await.ok_or(RegistryError::NotFound)?;
        let (snapshot, release) = {
            let mut session = handle.write().await;
            if let Some(missing) = session.first_missing_part() {
                return Err(RegistryError::MissingPart(missing));
            }
            session.transition_to(UploadStatus::Uploaded)?;
            let release = std::mem::replace(&mut session.holds_admission, false);
            (session.snapshot(), release)
        };
        if release {
            self.release_admission().await;
        }
        Ok(snapshot)
    }

    /// Drive a session to a new status, recording an error detail if given.
    /// Illegal transitions are rejected. Failing a session that never
    /// completed also releases its admission slot.
    pub async fn update_status(
        &self,
        id: UploadId,
        status: UploadStatus,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        let handle = self.session_handle(id).await.ok_or(RegistryError::NotFound)?;
        let release = {
            let mut session = handle.write().await;
            session.transition_to(status)?;
            if let Some(detail) = error {
                session.error = Some(detail);
            }
            status == UploadStatus::Failed
                && std::mem::replace(&mut session.holds_admission, false)
        };
        if release {
            self.release_admission().await;
        }
        Ok(())
    }

    /// Record the final publish path. Only legal while the session is
    /// merging.
    pub async fn set_output_path(
        &self,
        id: UploadId,
        path: std::path::PathBuf,
    ) -> Result<(), RegistryError> {
        let handle = self.session_handle(id).await.ok_or(RegistryError::NotFound)?;
        let mut session = handle.write().await;
        if session.status != UploadStatus::Merging {
            return Err(lectern_core::Error::InvalidUpload(format!(
                "output path set while {}",
                session.status
            ))
            .into());
        }
        session.output_path = Some(path);
        Ok(())
    }

    /// Immutable copy of a session for safe concurrent reads.
    pub async fn snapshot(&self, id: UploadId) -> Result<SessionSnapshot, RegistryError> {
        let handle = self.session_handle(id).await.ok_or(RegistryError::NotFound)?;
        let session = handle.read().await;
        Ok(session.snapshot())
    }

    /// Current number of admitted sessions (ingress-facing states only).
    pub async fn admitted_count(&self) -> u32 {
        *self.admitted.lock().await
    }

    async fn session_handle(&self, id: UploadId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn release_admission(&self) {
        let mut admitted = self.admitted.lock().await;
        *admitted = admitted.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(max_concurrent: u32) -> ServerConfig {
        ServerConfig {
            chunk_size: 1024,
            max_concurrent_uploads: max_concurrent,
            write_workers: 2,
            write_queue_depth: 8,
            ..Default::default()
        }
    }

    fn registry_in(dir: &std::path::Path, max_concurrent: u32) -> SessionRegistry {
        let layout = StoreLayout::new(dir);
        let writer = WriterPool::spawn(2, 8, false);
        SessionRegistry::new(&test_config(max_concurrent), layout, writer)
    }

    fn init_request(size: u64) -> InitUploadRequest {
        InitUploadRequest {
            lesson_id: "lesson-1".to_string(),
            filename: "intro.mp4".to_string(),
            size,
            content_type: None,
            material_id: None,
        }
    }

    async fn create(registry: &SessionRegistry, size: u64) -> (SessionSnapshot, UploadToken) {
        registry
            .create_session(&init_request(size), UploadKind::Video, "video/mp4".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_validates_before_admission() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 1);

        let mut bad = init_request(0);
        assert!(matches!(
            registry
                .create_session(&bad, UploadKind::Video, "video/mp4".into())
                .await,
            Err(RegistryError::Domain(_))
        ));

        bad = init_request(10);
        bad.filename = "../escape".to_string();
        assert!(
            registry
                .create_session(&bad, UploadKind::Video, "video/mp4".into())
                .await
                .is_err()
        );

        // Failed validations must not consume admission.
        assert_eq!(registry.admitted_count().await, 0);
    }

    #[tokio::test]
    async fn admission_rejects_at_cap_without_staging_dir() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 2);

        create(&registry, 10).await;
        create(&registry, 10).await;
        let err = registry
            .create_session(&init_request(10), UploadKind::Video, "video/mp4".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::TooManyUploads));
        assert_eq!(registry.admitted_count().await, 2);

        // Only the two admitted sessions created staging directories.
        let staged = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(staged, 2);
    }

    #[tokio::test]
    async fn token_validation_is_indistinguishable_for_unknown_and_wrong() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, token) = create(&registry, 10).await;

        registry
            .validate_token(snapshot.id, token.reveal())
            .await
            .unwrap();
        assert!(matches!(
            registry.validate_token(snapshot.id, "wrong").await,
            Err(RegistryError::Unauthorized)
        ));
        assert!(matches!(
            registry.validate_token(UploadId::new(), token.reveal()).await,
            Err(RegistryError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn save_part_is_idempotent_per_index() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 2048).await;

        registry
            .save_part(snapshot.id, 1, Bytes::from(vec![7u8; 1024]))
            .await
            .unwrap();
        registry
            .save_part(snapshot.id, 1, Bytes::from(vec![7u8; 1024]))
            .await
            .unwrap();

        let snap = registry.snapshot(snapshot.id).await.unwrap();
        assert_eq!(snap.received_bytes, 1024);
        assert_eq!(snap.status, UploadStatus::Receiving);
    }

    #[tokio::test]
    async fn save_part_rejects_out_of_range() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 2048).await;

        for part in [0u32, 3] {
            let err = registry
                .save_part(snapshot.id, part, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::PartOutOfRange { .. }));
        }
    }

    #[tokio::test]
    async fn mark_complete_reports_smallest_missing_part() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 3 * 1024).await;

        registry
            .save_part(snapshot.id, 1, Bytes::from(vec![1u8; 1024]))
            .await
            .unwrap();
        registry
            .save_part(snapshot.id, 3, Bytes::from(vec![3u8; 1024]))
            .await
            .unwrap();

        let err = registry.mark_complete(snapshot.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::MissingPart(2)));

        // No mutation happened.
        let snap = registry.snapshot(snapshot.id).await.unwrap();
        assert_eq!(snap.status, UploadStatus::Receiving);
        assert_eq!(registry.admitted_count().await, 1);
    }

    #[tokio::test]
    async fn complete_releases_admission_at_uploaded() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 1);
        let (snapshot, _) = create(&registry, 1024).await;
        assert_eq!(registry.admitted_count().await, 1);

        registry
            .save_part(snapshot.id, 1, Bytes::from(vec![0u8; 1024]))
            .await
            .unwrap();
        let snap = registry.mark_complete(snapshot.id).await.unwrap();
        assert_eq!(snap.status, UploadStatus::Uploaded);
        assert_eq!(registry.admitted_count().await, 0);

        // The slot is free for a new session even though this one is
        // not terminal yet.
        create(&registry, 1024).await;
    }

    #[tokio::test]
    async fn early_failure_releases_admission_once() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 1024).await;

        registry
            .update_status(snapshot.id, UploadStatus::Failed, Some("boom".into()))
            .await
            .unwrap();
        assert_eq!(registry.admitted_count().await, 0);

        let snap = registry.snapshot(snapshot.id).await.unwrap();
        assert_eq!(snap.status, UploadStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("boom"));
        assert!(snap.completed_at.is_some());
    }

    #[tokio::test]
    async fn update_status_rejects_illegal_transitions() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 1024).await;

        let err = registry
            .update_status(snapshot.id, UploadStatus::Ready, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Domain(lectern_core::Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn output_path_only_while_merging() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 1024).await;

        assert!(
            registry
                .set_output_path(snapshot.id, dir.path().join("out"))
                .await
                .is_err()
        );

        registry
            .save_part(snapshot.id, 1, Bytes::from(vec![0u8; 1024]))
            .await
            .unwrap();
        registry.mark_complete(snapshot.id).await.unwrap();
        registry
            .update_status(snapshot.id, UploadStatus::Merging, None)
            .await
            .unwrap();
        registry
            .set_output_path(snapshot.id, dir.path().join("out"))
            .await
            .unwrap();

        let snap = registry.snapshot(snapshot.id).await.unwrap();
        assert_eq!(snap.output_path, Some(dir.path().join("out")));
    }

    #[tokio::test]
    async fn list_parts_cross_checks_disk() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path(), 4);
        let (snapshot, _) = create(&registry, 3 * 1024).await;

        for part in [1u32, 2] {
            registry
                .save_part(snapshot.id, part, Bytes::from(vec![0u8; 1024]))
                .await
                .unwrap();
        }

        let listing = registry.list_parts(snapshot.id).await.unwrap();
        assert_eq!(listing.received, vec![1, 2]);
        assert_eq!(listing.total, 3);
        assert_eq!(listing.missing, 1);

        // A part dropped out-of-band disappears from the listing even
        // though the bitmap still contains it.
        std::fs::remove_file(dir.path().join(format!(
            "tmp/{}/parts/part-2",
            snapshot.id
        )))
        .unwrap();
        let listing = registry.list_parts(snapshot.id).await.unwrap();
        assert_eq!(listing.received, vec![1]);
        assert_eq!(listing.missing, 2);
    }
}
