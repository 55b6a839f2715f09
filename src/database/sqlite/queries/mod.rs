
use super::models::IndexedDocument;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

pub struct IndexedDocumentQueries;

impl IndexedDocumentQueries {
    #[inline]
    pub async fn get_by_path(pool: &SqlitePool, path: &str) -> Result<Option<IndexedDocument>> {
        let result = sqlx::query_as::<_, IndexedDocument>(
            r#"
            SELECT path, content_hash, page_count, chunk_count, indexed_at
            FROM indexed_documents WHERE path = ?
            "#,
        )
        .bind(path)
        .fetch_optional(pool)
        .await
        .context("Failed to get indexed document")?;

        Ok(result)
    }

    /// Insert the row, or replace the existing row for the same path
    #[inline]
    pub async fn upsert(pool: &SqlitePool, document: &IndexedDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexed_documents (path, content_hash, page_count, chunk_count, indexed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content_hash = excluded.content_hash,
                page_count = excluded.page_count,
                chunk_count = excluded.chunk_count,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&document.path)
        .bind(&document.content_hash)
        .bind(document.page_count)
        .bind(document.chunk_count)
        .bind(document.indexed_at)
        .execute(pool)
        .await
        .context("Failed to upsert indexed document")?;

        debug!("Recorded manifest row for {}", document.path);
        Ok(())
    }

    /// Returns whether a row was removed
    #[inline]
    pub async fn remove(pool: &SqlitePool, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM indexed_documents WHERE path = ?")
            .bind(path)
            .execute(pool)
            .await
            .context("Failed to remove indexed document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IndexedDocument>> {
        let documents = sqlx::query_as::<_, IndexedDocument>(
            r#"
            SELECT path, content_hash, page_count, chunk_count, indexed_at
            FROM indexed_documents ORDER BY path
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list indexed documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn clear(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM indexed_documents")
            .execute(pool)
            .await
            .context("Failed to clear indexed documents")?;

        Ok(result.rows_affected())
    }
}
