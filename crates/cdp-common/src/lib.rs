//! CDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared foundation for the CDP workspace members:
//!
//! - **Error Handling**: the [`CdpError`] type and [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by the server binary and
//!   integration tests

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CdpError, Result};
