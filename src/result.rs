//! Search result type.

use serde::{Deserialize, Serialize};

/// Validated image URLs for one query.
///
/// Serializes to the response shape `{query, count, images}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The trimmed query as the caller sent it.
    pub query: String,
    /// Number of images.
    pub count: usize,
    /// Validated image URLs in candidate order.
    pub images: Vec<String>,
    /// Requested maximum number of images.
    #[serde(skip)]
    pub limit: usize,
}

impl SearchResult {
    /// Creates a result, truncating `images` to `limit`.
    pub fn new(query: impl Into<String>, limit: usize, mut images: Vec<String>) -> Self {
        images.truncate(limit);
        Self {
            query: query.into(),
            count: images.len(),
            images,
            limit,
        }
    }

    /// Creates a result with no images.
    pub fn empty(query: impl Into<String>, limit: usize) -> Self {
        Self::new(query, limit, Vec::new())
    }

    /// Whether no image was found.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
