//! Shared domain types

use serde::{Deserialize, Serialize};

/// Pagination window for list queries.
///
/// ```rust,ignore
/// use docprep_common::types::Pagination;
///
/// let pagination = Pagination {
///     limit: 20,
///     offset: 0,
/// };
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// Maximum number of items to return
    pub limit: i64,

    /// Number of items to skip
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Creates a new pagination instance with custom values.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    /// Creates pagination for a specific page with a given page size.
    pub fn page(page: i64, page_size: i64) -> Self {
        Self {
            limit: page_size,
            offset: page * page_size,
        }
    }

    /// Clamp the window to sane bounds; zero or negative limits fall back to
    /// the default page size.
    pub fn clamped(self, max_limit: i64) -> Self {
        let limit = if self.limit <= 0 {
            Self::default().limit
        } else {
            self.limit.min(max_limit)
        };
        Self {
            limit,
            offset: self.offset.max(0),
        }
    }
}
