//! Lectern server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use lectern_core::config::AppConfig;
use lectern_core::layout::StoreLayout;
use lectern_server::access::HttpAccessVerifier;
use lectern_server::notify::HttpNotifier;
use lectern_server::probe::FfprobeProber;
use lectern_server::{AppState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lectern - chunked upload service for lesson media
#[derive(Parser, Debug)]
#[command(name = "lecternd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LECTERN_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lectern v{}", env!("CARGO_PKG_VERSION"));

    // Configuration: optional file, env vars can provide/override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LECTERN_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // The publish trees are served by a sibling static server; create them
    // up front so it has something to point at.
    let layout = StoreLayout::new(&config.storage.base_dir);
    for dir in [layout.tmp_dir(), layout.videos_dir(), layout.materials_dir()] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    tracing::info!(base_dir = %config.storage.base_dir.display(), "Store directories ready");

    let notifier = Arc::new(HttpNotifier::new(&config.upstream));
    let prober = Arc::new(FfprobeProber::new(config.probe.ffprobe_path.clone()));
    let access: Option<Arc<dyn lectern_server::access::LessonAccessVerifier>> =
        if config.upstream.verify_lesson_access {
            Some(Arc::new(HttpAccessVerifier::new(&config.upstream)))
        } else {
            None
        };
    if access.is_some() {
        tracing::info!("Lesson-access verification enabled");
    }

    tracing::info!(
        max_concurrent_uploads = config.server.max_concurrent_uploads,
        write_workers = config.server.write_workers,
        merge_workers = config.server.merge_workers,
        chunk_size = config.server.chunk_size,
        "Upload engine configured"
    );

    let bind = config.server.bind.clone();
    let state = AppState::new(config, notifier, prober, access);
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server exited");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
