//! Merge pipeline: assemble parts, publish, notify, clean up.
//!
//! Completed uploads are enqueued as merge jobs on a bounded queue drained
//! by a fixed set of workers. A worker streams the ordered parts through a
//! large copy buffer into the temporary output file while feeding a SHA-1
//! accumulator, publishes the result into its final path via
//! rename-or-copy, records the outcome on the session, notifies the
//! upstream application, and schedules staging cleanup.

use crate::notify::CompletionNotifier;
use crate::probe::DurationProber;
use crate::registry::SessionRegistry;
use lectern_core::config::AppConfig;
use lectern_core::layout::StoreLayout;
use lectern_core::upload::{
    MaterialReadyNotification, SessionSnapshot, UploadId, UploadKind, UploadStatus,
    VideoReadyNotification,
};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Copy buffer size for the rename-fallback byte copy.
const COPY_FALLBACK_BUFFER: usize = 8 * 1024 * 1024;

/// A queued merge job. The snapshot is taken at enqueue time so workers
/// never hold registry locks while merging.
#[derive(Debug)]
pub struct MergeJob {
    pub upload_id: UploadId,
    pub session: SessionSnapshot,
}

/// Producer side of the bounded merge queue.
#[derive(Clone)]
pub struct MergeQueue {
    tx: flume::Sender<MergeJob>,
}

impl MergeQueue {
    /// Create the queue, returning the consumer end for the worker pool.
    pub fn new(depth: usize) -> (Self, flume::Receiver<MergeJob>) {
        let (tx, rx) = flume::bounded(depth);
        (Self { tx }, rx)
    }

    /// Enqueue a job, waiting for queue space if the merge backlog is at
    /// capacity.
    pub async fn enqueue(&self, job: MergeJob) -> Result<(), crate::ApiError> {
        self.tx
            .send_async(job)
            .await
            .map_err(|_| crate::ApiError::Internal("merge queue is closed".to_string()))
    }
}

/// Everything a merge worker needs.
#[derive(Clone)]
pub struct MergeContext {
    pub registry: Arc<SessionRegistry>,
    pub layout: StoreLayout,
    pub config: Arc<AppConfig>,
    pub notifier: Arc<dyn CompletionNotifier>,
    pub prober: Arc<dyn DurationProber>,
}

/// Spawn the fixed merge worker set.
pub fn spawn_merge_workers(ctx: MergeContext, rx: flume::Receiver<MergeJob>, count: usize) {
    for worker_id in 0..count {
        let ctx = ctx.clone();
        let rx = rx.clone();
        tokio::spawn(async move {
            tracing::debug!(worker_id, "merge worker started");
            while let Ok(job) = rx.recv_async().await {
                process_merge(&ctx, job).await;
            }
        });
    }
}

#[derive(Debug, thiserror::Error)]
enum MergeError {
    #[error("failed to create output file: {0}")]
    CreateOutput(std::io::Error),

    #[error("failed to open part {part}: {source}")]
    OpenPart { part: u32, source: std::io::Error },

    #[error("failed to copy part {part}: {source}")]
    CopyPart { part: u32, source: std::io::Error },

    #[error("failed to create final directory: {0}")]
    CreateFinalDir(std::io::Error),

    #[error("failed to move file: {0}")]
    Publish(std::io::Error),

    #[error(transparent)]
    Path(#[from] lectern_core::Error),
}

struct MergeOutcome {
    output_path: PathBuf,
    hash: String,
    material_id: Option<String>,
}

/// Run one merge job to a terminal session state.
async fn process_merge(ctx: &MergeContext, job: MergeJob) {
    let id = job.upload_id;

    // Jobs for sessions that already settled are dropped.
    match ctx.registry.snapshot(id).await {
        Ok(current) if current.status.is_terminal() => {
            tracing::warn!(upload_id = %id, status = %current.status, "dropping merge job for settled session");
            return;
        }
        Err(e) => {
            tracing::warn!(upload_id = %id, error = %e, "dropping merge job for unknown session");
            return;
        }
        Ok(_) => {}
    }

    if let Err(e) = ctx
        .registry
        .update_status(id, UploadStatus::Merging, None)
        .await
    {
        tracing::warn!(upload_id = %id, error = %e, "could not start merge");
        return;
    }

    match merge_parts(ctx, &job).await {
        Ok(outcome) => {
            if let Err(e) = ctx.registry.set_output_path(id, outcome.output_path.clone()).await {
                tracing::error!(upload_id = %id, error = %e, "failed to record output path");
            }
            if let Err(e) = ctx.registry.update_status(id, UploadStatus::Ready, None).await {
                tracing::error!(upload_id = %id, error = %e, "failed to mark session ready");
                return;
            }
            tracing::info!(
                upload_id = %id,
                path = %outcome.output_path.display(),
                hash = %outcome.hash,
                "upload merged and published"
            );

            let duration = probe_duration(ctx, &job.session, &outcome).await;
            notify_upstream(ctx, &job, &outcome, duration).await;
            cleanup(ctx, id).await;
        }
        Err(e) => {
            tracing::error!(upload_id = %id, error = %e, "merge failed");
            if let Err(update_err) = ctx
                .registry
                .update_status(id, UploadStatus::Failed, Some(e.to_string()))
                .await
            {
                tracing::error!(upload_id = %id, error = %update_err, "failed to mark session failed");
            }
        }
    }
}

/// Assemble ordered parts into the published artifact and hash them.
async fn merge_parts(ctx: &MergeContext, job: &MergeJob) -> Result<MergeOutcome, MergeError> {
    let id = job.upload_id;
    let session = &job.session;

    let temp_output = ctx.layout.merge_output_path(id, &session.filename);
    let mut output = fs::File::create(&temp_output)
        .await
        .map_err(MergeError::CreateOutput)?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; ctx.config.server.merge_buffer_size];

    for part in 1..=session.total_parts {
        let mut part_file = fs::File::open(ctx.layout.part_path(id, part))
            .await
            .map_err(|source| MergeError::OpenPart { part, source })?;
        loop {
            let n = part_file
                .read(&mut buffer)
                .await
                .map_err(|source| MergeError::CopyPart { part, source })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            output
                .write_all(&buffer[..n])
                .await
                .map_err(|source| MergeError::CopyPart { part, source })?;
        }
    }

    if ctx.config.server.fsync {
        output.sync_all().await.map_err(MergeError::CreateOutput)?;
    }
    drop(output);

    let hash = hex_digest(hasher);

    let (final_dir, final_path, material_id) = match session.kind {
        UploadKind::Video => (
            ctx.layout.video_dir(&session.lesson_id)?,
            ctx.layout.video_path(&session.lesson_id)?,
            None,
        ),
        UploadKind::Material => {
            // A fresh identifier keeps material URLs stable when the client
            // supplied none at init.
            let material_id = session
                .material_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let dir = ctx.layout.material_dir(&session.lesson_id, &material_id)?;
            let path =
                ctx.layout
                    .material_path(&session.lesson_id, &material_id, &session.filename)?;
            (dir, path, Some(material_id))
        }
    };

    fs::create_dir_all(&final_dir)
        .await
        .map_err(MergeError::CreateFinalDir)?;

    if fs::rename(&temp_output, &final_path).await.is_err() {
        // Cross-device staging and publish trees: fall back to a byte copy.
        copy_file(&temp_output, &final_path)
            .await
            .map_err(MergeError::Publish)?;
        let _ = fs::remove_file(&temp_output).await;
    }

    Ok(MergeOutcome {
        output_path: final_path,
        hash,
        material_id,
    })
}

async fn probe_duration(
    ctx: &MergeContext,
    session: &SessionSnapshot,
    outcome: &MergeOutcome,
) -> u32 {
    if session.kind != UploadKind::Video {
        return 0;
    }
    match ctx.prober.duration_seconds(&outcome.output_path).await {
        Ok(duration) => duration,
        Err(e) => {
            tracing::warn!(upload_id = %session.id, error = %e, "failed to extract duration");
            0
        }
    }
}

/// Notify the completion collaborator. Failures are logged; the artifact
/// is already published, so the session stays `Ready`.
async fn notify_upstream(ctx: &MergeContext, job: &MergeJob, outcome: &MergeOutcome, duration: u32) {
    let session = &job.session;
    let public_base = ctx.config.upstream.public_base();

    let result = match session.kind {
        UploadKind::Video => {
            ctx.notifier
                .video_ready(VideoReadyNotification {
                    lesson_id: session.lesson_id.clone(),
                    video_url: format!("{public_base}/videos/{}/video.mp4", session.lesson_id),
                    duration_in_seconds: (duration > 0).then_some(duration),
                })
                .await
        }
        UploadKind::Material => {
            let material_id = outcome
                .material_id
                .clone()
                .unwrap_or_else(|| job.upload_id.to_string());
            ctx.notifier
                .material_ready(MaterialReadyNotification {
                    lesson_id: session.lesson_id.clone(),
                    file_url: format!(
                        "{public_base}/materials/{}/{material_id}/{}",
                        session.lesson_id, session.filename
                    ),
                    material_id,
                    filename: session.filename.clone(),
                    size_bytes: Some(session.expected_size),
                    content_type: Some(session.content_type.clone()),
                })
                .await
        }
    };

    if let Err(e) = result {
        tracing::warn!(upload_id = %job.upload_id, error = %e, "completion notification failed");
    }
}

/// Remove the parts directory now; keep the upload directory for a grace
/// delay to tolerate late retries, then remove it too.
async fn cleanup(ctx: &MergeContext, id: UploadId) {
    let parts_dir = ctx.layout.parts_dir(id);
    if let Err(e) = fs::remove_dir_all(&parts_dir).await {
        tracing::warn!(upload_id = %id, error = %e, "failed to clean up parts");
    }

    let upload_dir = ctx.layout.upload_dir(id);
    let grace = ctx.config.server.cleanup_grace();
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        if let Err(e) = fs::remove_dir_all(&upload_dir).await {
            tracing::debug!(upload_dir = %upload_dir.display(), error = %e, "failed to clean up upload dir");
        }
    });
}

fn hex_digest(hasher: Sha1) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Byte-copy fallback when rename crosses filesystems. The destination is
/// synced so the publish is as atomic as a copy can be.
async fn copy_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let mut source = fs::File::open(src).await?;
    let mut dest = fs::File::create(dst).await?;
    let mut buffer = vec![0u8; COPY_FALLBACK_BUFFER];
    loop {
        let n = source.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        dest.write_all(&buffer[..n]).await?;
    }
    dest.sync_all().await
}
