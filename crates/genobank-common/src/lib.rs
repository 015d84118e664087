//! Genobank Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Genobank workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`GenobankError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Checksums**: SHA-256 digests for produced matrix artifacts
//! - **Types**: Vocabulary shared between the ingest library and its callers
//!
//! # Example
//!
//! ```no_run
//! use genobank_common::checksum::sha256_file;
//! use genobank_common::Result;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = sha256_file(path)?;
//!     tracing::info!(%digest, "artifact fingerprint");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{GenobankError, Result};
pub use types::{MatrixFormat, MemberKind, Orientation};
