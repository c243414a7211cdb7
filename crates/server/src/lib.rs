//! Lectern server: HTTP surface and background pipelines for the
//! chunked lesson-media upload service.

pub mod access;
pub mod auth;
pub mod bufpool;
pub mod error;
pub mod handlers;
pub mod merge;
pub mod notify;
pub mod probe;
pub mod registry;
pub mod routes;
pub mod state;
pub mod writer;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
