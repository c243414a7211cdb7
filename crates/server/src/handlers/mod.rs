//! HTTP request handlers.

pub mod common;
pub mod files;
pub mod uploads;

pub use common::*;
pub use files::*;
pub use uploads::*;
