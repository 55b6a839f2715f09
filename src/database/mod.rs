// Database module
// LanceDB holds the chunk vectors, SQLite holds the per-document index manifest

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::vector_store::{SearchResult, VectorStore};
pub use self::lancedb::{ChunkMetadata, IndexEntry};
pub use sqlite::Database;
pub use sqlite::models::IndexedDocument;
