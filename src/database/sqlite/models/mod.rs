
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Manifest row for a document whose entries are committed to the vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexedDocument {
    pub path: String,
    /// Lowercase hex SHA-256 of the PDF bytes
    pub content_hash: String,
    pub page_count: i64,
    pub chunk_count: i64,
    pub indexed_at: DateTime<Utc>,
}

impl IndexedDocument {
    /// Whether the indexed copy was built from exactly these bytes
    #[inline]
    pub fn is_fresh(&self, content_hash: &str) -> bool {
        self.content_hash == content_hash
    }
}
