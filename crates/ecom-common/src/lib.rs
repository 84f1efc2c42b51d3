//! ecom-etl Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the ecom-etl workspace.
//!
//! - **Error Handling**: [`EtlError`] covers every failure the pipeline can
//!   report, from unreadable documents to constraint violations on a target.
//! - **Logging**: [`logging`] configures the global `tracing` subscriber.
//!
//! # Example
//!
//! ```no_run
//! use ecom_common::{EtlError, Result};
//!
//! fn check_document(name: &str, text: &str) -> Result<()> {
//!     if text.trim().is_empty() {
//!         return Err(EtlError::load(name, "document is empty"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{EtlError, Result};
