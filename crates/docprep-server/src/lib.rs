//! Docprep Ingestion Server Library
#![recursion_limit = "256"]
//!
//! HTTP server orchestrating the document-preparation pipeline.
//!
//! # Overview
//!
//! The server tracks uploaded files and registered links through a
//! multi-stage processing pipeline and keeps that state reconciled with the
//! object store:
//!
//! - **Item Store**: PostgreSQL records for every tracked file and link
//! - **Downstream Clients**: extraction, compression, splitting, guard,
//!   embedding and vector-ingestion services over HTTP
//! - **Task Executor**: per-item pipeline jobs with bounded retries and
//!   cancellation
//! - **Reconciliation**: diff/apply between live bucket listings and the
//!   item store
//! - **Ingestion API**: bucket-notification webhook plus item lifecycle
//!   endpoints
//!
//! # Example
//!
//! ```no_run
//! use docprep_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     api::serve(config).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use error::{ApiResult, AppError};
