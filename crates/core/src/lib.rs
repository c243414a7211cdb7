//! Core domain types and shared logic for the lectern upload service.
//!
//! This crate defines the canonical data model used across the workspace:
//! - Upload session identity and lifecycle
//! - Upload capability tokens
//! - The on-disk store layout (staging and publish trees)
//! - Configuration types

pub mod config;
pub mod error;
pub mod layout;
pub mod token;
pub mod upload;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use layout::StoreLayout;
pub use token::UploadToken;
pub use upload::{UploadId, UploadKind, UploadSession, UploadStatus};

/// Default part size: 16 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Extra request-body allowance beyond the part size, for framing overhead.
pub const PART_SIZE_SLACK: u64 = 1024;
