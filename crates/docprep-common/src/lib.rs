//! Docprep Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the docprep workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all docprep members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing setup (console/file, text/JSON)
//! - **Types**: Shared domain types such as pagination and link handling
//!
//! # Example
//!
//! ```no_run
//! use docprep_common::{Result, DocprepError};
//! use docprep_common::links::normalize_link;
//!
//! fn register(uri: &str) -> Result<()> {
//!     let link = normalize_link(uri)?;
//!     println!("registering {}", link);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod links;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{DocprepError, Result};
