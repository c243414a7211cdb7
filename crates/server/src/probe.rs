//! Video duration probing.
//!
//! Published videos are probed with ffprobe so the upstream notification
//! can carry a duration. Probing is best-effort: any failure is logged by
//! the caller and the notification goes out with no duration.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Errors from duration probing.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffprobe exited with {0}")]
    Exit(std::process::ExitStatus),

    #[error("unreadable duration: {0}")]
    Parse(String),
}

/// Extracts the duration of a media file in whole seconds.
#[async_trait]
pub trait DurationProber: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<u32, ProbeError>;
}

/// ffprobe-backed prober.
pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

#[async_trait]
impl DurationProber for FfprobeProber {
    async fn duration_seconds(&self, path: &Path) -> Result<u32, ProbeError> {
        let output = Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Exit(output.status));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's duration output, rounded to the nearest whole second.
fn parse_duration(raw: &str) -> Result<u32, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let seconds: f64 = trimmed
        .parse()
        .map_err(|_| ProbeError::Parse(trimmed.to_string()))?;
    Ok(seconds.max(0.0).round() as u32)
}
