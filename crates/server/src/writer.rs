//! Bounded asynchronous file writer pool.
//!
//! Part writes are offloaded from request-serving tasks to a fixed set of
//! worker tasks draining a bounded queue, so the ingress path returns
//! quickly under bursty concurrent parts. The offer path is non-blocking:
//! when the queue is full the caller performs the write inline, which
//! naturally slows clients down instead of queueing unboundedly.
//!
//! Writes are one-shot (create + truncate + full-buffer write) and are not
//! fsynced unless the `fsync` flag is set; in-flight uploads are already
//! lost on crash because sessions live in memory.

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

/// A queued write: destination path, payload, and the caller's completion
/// signal. The pool owns the job once enqueued and treats the bytes as
/// read-only.
struct WriteJob {
    path: PathBuf,
    bytes: Bytes,
    done: oneshot::Sender<io::Result<()>>,
}

/// Fixed pool of writer workers draining a bounded queue.
pub struct WriterPool {
    tx: flume::Sender<WriteJob>,
    fsync: bool,
    overflows: AtomicU64,
}

impl WriterPool {
    /// Spawn `workers` writer tasks behind a queue of depth `queue_depth`.
    pub fn spawn(workers: usize, queue_depth: usize, fsync: bool) -> Arc<Self> {
        let (tx, rx) = flume::bounded(queue_depth);
        for worker_id in 0..workers {
            let rx = rx.clone();
            tokio::spawn(run_worker(worker_id, rx, fsync));
        }
        Arc::new(Self {
            tx,
            fsync,
            overflows: AtomicU64::new(0),
        })
    }

    /// Persist `bytes` at `path`.
    ///
    /// Offers the job to the queue without blocking; if the queue is full
    /// the write happens inline on the calling task and the overflow is
    /// counted. Either way the result of the actual write is returned and
    /// no retry is attempted.
    pub async fn save(&self, path: PathBuf, bytes: Bytes) -> io::Result<()> {
        let (done, done_rx) = oneshot::channel();
        match self.tx.try_send(WriteJob { path, bytes, done }) {
            Ok(()) => match done_rx.await {
                Ok(result) => result,
                Err(_) => Err(io::Error::other("write worker dropped the job")),
            },
            Err(flume::TrySendError::Full(job)) | Err(flume::TrySendError::Disconnected(job)) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    path = %job.path.display(),
                    "write queue full, writing inline"
                );
                write_file(&job.path, &job.bytes, self.fsync).await
            }
        }
    }

    /// How many writes bypassed the queue because it was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

async fn run_worker(worker_id: usize, rx: flume::Receiver<WriteJob>, fsync: bool) {
    tracing::debug!(worker_id, "file writer started");
    while let Ok(job) = rx.recv_async().await {
        let result = write_file(&job.path, &job.bytes, fsync).await;
        // The caller may have gone away; the write itself still happened.
        let _ = job.done.send(result);
    }
}

/// One-shot write: create + truncate, single write call, optional fsync.
async fn write_file(path: &Path, bytes: &[u8], fsync: bool) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    options.mode(0o644);
    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    if fsync {
        file.sync_all().await?;
    }
    Ok(())
}
