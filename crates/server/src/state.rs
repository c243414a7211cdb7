//! Application state shared across handlers.

use crate::access::LessonAccessVerifier;
use crate::bufpool::BufferPool;
use crate::merge::{MergeContext, MergeQueue, spawn_merge_workers};
use crate::notify::CompletionNotifier;
use crate::probe::DurationProber;
use crate::registry::SessionRegistry;
use crate::writer::WriterPool;
use lectern_core::config::AppConfig;
use lectern_core::layout::StoreLayout;
use std::sync::Arc;

/// Upper bound on retained ingress read buffers.
const MAX_POOLED_BUFFERS: usize = 32;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Resolved store directories.
    pub layout: StoreLayout,
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Writer pool (exposed for observability).
    pub writer: Arc<WriterPool>,
    /// Reusable ingress read buffers.
    pub buffers: Arc<BufferPool>,
    /// Merge queue producer.
    pub merge_queue: MergeQueue,
    /// Completion collaborator.
    pub notifier: Arc<dyn CompletionNotifier>,
    /// Optional lesson-access verifier (wired when configured).
    pub access: Option<Arc<dyn LessonAccessVerifier>>,
}

impl AppState {
    /// Create the application state and spawn the writer and merge worker
    /// pools.
    pub fn new(
        config: AppConfig,
        notifier: Arc<dyn CompletionNotifier>,
        prober: Arc<dyn DurationProber>,
        access: Option<Arc<dyn LessonAccessVerifier>>,
    ) -> Self {
        let config = Arc::new(config);
        let layout = StoreLayout::new(&config.storage.base_dir);

        let writer = WriterPool::spawn(
            config.server.write_workers,
            config.server.write_queue_depth,
            config.server.fsync,
        );
        let registry = Arc::new(SessionRegistry::new(
            &config.server,
            layout.clone(),
            writer.clone(),
        ));
        let buffers = Arc::new(BufferPool::new(
            config.server.upload_buffer_size,
            MAX_POOLED_BUFFERS,
        ));

        let (merge_queue, merge_rx) = MergeQueue::new(config.server.merge_queue_depth);
        let ctx = MergeContext {
            registry: registry.clone(),
            layout: layout.clone(),
            config: config.clone(),
            notifier: notifier.clone(),
            prober,
        };
        spawn_merge_workers(ctx, merge_rx, config.server.merge_workers);

        Self {
            config,
            layout,
            registry,
            writer,
            buffers,
            merge_queue,
            notifier,
            access,
        }
    }
}
