use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::IndexedDocument;
use crate::database::sqlite::queries::IndexedDocumentQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

pub const MANIFEST_FILE_NAME: &str = "manifest.db";

/// Index manifest: which documents are committed to the vector index, and from which bytes
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `<persist_dir>/manifest.db`, creating the directory if needed
    #[inline]
    pub async fn initialize_from_persist_dir(persist_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(persist_dir).with_context(|| {
            format!(
                "Failed to create persist directory: {}",
                persist_dir.display()
            )
        })?;

        Self::new(persist_dir.join(MANIFEST_FILE_NAME)).await
    }

    #[inline]
    pub async fn get_document(&self, path: &str) -> Result<Option<IndexedDocument>> {
        IndexedDocumentQueries::get_by_path(&self.pool, path).await
    }

    #[inline]
    pub async fn record_document(&self, document: &IndexedDocument) -> Result<()> {
        IndexedDocumentQueries::upsert(&self.pool, document).await
    }

    #[inline]
    pub async fn remove_document(&self, path: &str) -> Result<bool> {
        IndexedDocumentQueries::remove(&self.pool, path).await
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<IndexedDocument>> {
        IndexedDocumentQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn clear(&self) -> Result<u64> {
        IndexedDocumentQueries::clear(&self.pool).await
    }
}
