
use super::{ChunkMetadata, IndexEntry};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const TABLE_NAME: &str = "chunks";
const VECTOR_COLUMN: &str = "vector";
const SOURCE_COLUMN: &str = "doc_source";

/// Persistent vector index over LanceDB.
///
/// The table is created lazily by the first `add`, using that batch's vector
/// dimension. Writers go through `&mut self`.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    path: PathBuf,
    vector_dimension: Option<usize>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub metadata: ChunkMetadata,
    pub similarity_score: f32,
    pub distance: f32,
}

fn store_error<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> RagError {
    move |e| RagError::Store(format!("{}: {}", context, e))
}

impl VectorStore {
    /// Open the index under `<persist_path>/vectors`, creating the directory if needed.
    ///
    /// Opening never writes to the table, so opening the same store twice
    /// yields the same contents.
    #[inline]
    pub async fn open_or_create(persist_path: &Path) -> Result<Self> {
        let db_path = persist_path.join("vectors");
        debug!("Opening LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path)?;

        let connection = lancedb::connect(&db_path.to_string_lossy())
            .execute()
            .await
            .map_err(store_error("Failed to connect to LanceDB"))?;

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            path: db_path,
            vector_dimension: None,
        };

        if let Some(table) = store.open_table().await? {
            let dimension = Self::detect_vector_dimension(&table).await?;
            info!("Opened existing index with vector dimension {}", dimension);
            store.vector_dimension = Some(dimension);
        } else {
            debug!("No index table yet, it will be created on first insert");
        }

        Ok(store)
    }

    /// Dimension of the stored vectors, once any have been written
    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(store_error("Failed to list tables"))?;

        if !table_names.contains(&self.table_name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(store_error("Failed to open table"))?;
        Ok(Some(table))
    }

    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(store_error("Failed to get table schema"))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == VECTOR_COLUMN)
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Store("Could not find vector column or determine dimension".to_string())
            })
    }

    fn create_schema(vector_dim: usize) -> Result<SchemaRef> {
        let list_size = i32::try_from(vector_dim)
            .map_err(|_| RagError::Store(format!("Vector dimension {} too large", vector_dim)))?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    list_size,
                ),
                false,
            ),
            Field::new(SOURCE_COLUMN, DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, false),
            Field::new("chunk_offset", DataType::UInt64, false),
            Field::new("chunk_index", DataType::UInt64, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Utf8, false),
        ])))
    }

    /// Append entries in a single commit.
    ///
    /// All entries must share one dimension, which must match the table's
    /// unless the table is still empty. Nothing is written on error.
    #[inline]
    pub async fn add(&mut self, entries: &[IndexEntry]) -> Result<usize> {
        let Some(first) = entries.first() else {
            debug!("No entries to store");
            return Ok(0);
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(RagError::Store("Cannot store empty vectors".to_string()));
        }
        if let Some(entry) = entries.iter().find(|e| e.vector.len() != vector_dim) {
            return Err(RagError::Store(format!(
                "Inconsistent vector dimensions in batch: expected {}, entry {} has {}",
                vector_dim,
                entry.id,
                entry.vector.len()
            )));
        }

        let record_batch = Self::create_record_batch(entries, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        match self.open_table().await? {
            Some(table) if self.vector_dimension == Some(vector_dim) => {
                table
                    .add(reader)
                    .execute()
                    .await
                    .map_err(store_error("Failed to insert entries"))?;
            }
            Some(table) => {
                let rows = table
                    .count_rows(None)
                    .await
                    .map_err(store_error("Failed to count rows"))?;
                if rows > 0 {
                    return Err(RagError::Store(format!(
                        "Vector dimension mismatch: index has {:?}, entries have {}",
                        self.vector_dimension, vector_dim
                    )));
                }

                info!(
                    "Recreating empty index table with vector dimension {}",
                    vector_dim
                );
                self.drop_table_if_exists().await?;
                self.create_table(reader).await?;
            }
            None => {
                info!("Creating index table with vector dimension {}", vector_dim);
                self.create_table(reader).await?;
            }
        }

        self.vector_dimension = Some(vector_dim);
        debug!("Stored {} entries", entries.len());
        Ok(entries.len())
    }

    async fn create_table<R>(&self, reader: R) -> Result<()>
    where
        R: arrow::record_batch::RecordBatchReader + Send + 'static,
    {
        self.connection
            .create_table(&self.table_name, reader)
            .execute()
            .await
            .map_err(store_error("Failed to create table"))?;
        Ok(())
    }

    fn create_record_batch(entries: &[IndexEntry], vector_dim: usize) -> Result<RecordBatch> {
        let len = entries.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut sources = Vec::with_capacity(len);
        let mut page_numbers = Vec::with_capacity(len);
        let mut chunk_offsets = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut indexed_ats = Vec::with_capacity(len);

        for entry in entries {
            ids.push(entry.id.as_str());
            flat_values.extend_from_slice(&entry.vector);
            sources.push(entry.metadata.source.as_str());
            page_numbers.push(entry.metadata.page_number);
            chunk_offsets.push(entry.metadata.chunk_offset as u64);
            chunk_indices.push(entry.metadata.chunk_index as u64);
            contents.push(entry.metadata.content.as_str());
            indexed_ats.push(entry.metadata.indexed_at.as_str());
        }

        let schema = Self::create_schema(vector_dim)?;

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(store_error("Failed to create vector array"))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(page_numbers)),
            Arc::new(UInt64Array::from(chunk_offsets)),
            Arc::new(UInt64Array::from(chunk_indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(indexed_ats)),
        ];

        RecordBatch::try_new(schema, arrays).map_err(store_error("Failed to create record batch"))
    }

    /// Return up to `k` entries nearest to `query_vector` by cosine distance, best first.
    ///
    /// Equal distances are ordered by source, then chunk index.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let Some(table) = self.open_table().await? else {
            debug!("Search on an index with no table");
            return Ok(Vec::new());
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(store_error("Failed to count rows"))?;
        if rows == 0 {
            return Ok(Vec::new());
        }

        if let Some(dim) = self.vector_dimension {
            if dim != query_vector.len() {
                return Err(RagError::Store(format!(
                    "Query vector has dimension {}, index has {}",
                    query_vector.len(),
                    dim
                )));
            }
        }

        debug!("Searching for {} nearest entries among {}", k, rows);

        let results = table
            .vector_search(query_vector)
            .map_err(store_error("Failed to create vector search"))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(store_error("Failed to execute search"))?;

        let mut search_results = Self::parse_search_results_stream(results).await?;
        search_results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.metadata.source.cmp(&b.metadata.source))
                .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        search_results.truncate(k);

        Ok(search_results)
    }

    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(store_error("Failed to read result stream"))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let sources = Self::column::<StringArray>(batch, SOURCE_COLUMN)?;
        let page_numbers = Self::column::<UInt32Array>(batch, "page_number")?;
        let chunk_offsets = Self::column::<UInt64Array>(batch, "chunk_offset")?;
        let chunk_indices = Self::column::<UInt64Array>(batch, "chunk_index")?;
        let contents = Self::column::<StringArray>(batch, "content")?;
        let indexed_ats = Self::column::<StringArray>(batch, "indexed_at")?;
        let distances = Self::column::<Float32Array>(batch, "_distance").ok();

        let results = (0..batch.num_rows())
            .map(|row| {
                let distance = distances
                    .filter(|d| !d.is_null(row))
                    .map_or(0.0, |d| d.value(row));

                SearchResult {
                    metadata: ChunkMetadata {
                        source: sources.value(row).to_string(),
                        page_number: page_numbers.value(row),
                        chunk_offset: chunk_offsets.value(row) as usize,
                        chunk_index: chunk_indices.value(row) as usize,
                        content: contents.value(row).to_string(),
                        indexed_at: indexed_ats.value(row).to_string(),
                    },
                    similarity_score: 1.0 - distance,
                    distance,
                }
            })
            .collect();

        Ok(results)
    }

    /// Total number of stored entries
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        match self.open_table().await? {
            Some(table) => table
                .count_rows(None)
                .await
                .map_err(store_error("Failed to count rows")),
            None => Ok(0),
        }
    }

    /// Remove every entry that belongs to `source`
    #[inline]
    pub async fn delete_source(&mut self, source: &str) -> Result<()> {
        let Some(table) = self.open_table().await? else {
            return Ok(());
        };

        debug!("Deleting entries for source: {}", source);
        let predicate = format!("{} = '{}'", SOURCE_COLUMN, source.replace('\'', "''"));
        table
            .delete(&predicate)
            .await
            .map_err(store_error("Failed to delete source entries"))?;

        Ok(())
    }

    /// Replace every entry of `source` with `entries`.
    ///
    /// The new entries are committed first and the previous ones removed
    /// afterwards, so a rejected or failed write leaves the old entries in
    /// place. If the cleanup fails the source briefly holds both generations
    /// and the next replace removes the older one.
    #[inline]
    pub async fn replace_source(&mut self, source: &str, entries: &[IndexEntry]) -> Result<()> {
        if let Some(entry) = entries.iter().find(|e| e.metadata.source != source) {
            return Err(RagError::Store(format!(
                "Entry {} belongs to {}, not {}",
                entry.id, entry.metadata.source, source
            )));
        }

        if entries.is_empty() {
            return self.delete_source(source).await;
        }

        self.add(entries).await?;

        let Some(table) = self.open_table().await? else {
            return Ok(());
        };
        let keep = entries
            .iter()
            .map(|e| format!("'{}'", e.id.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = format!(
            "{} = '{}' AND id NOT IN ({})",
            SOURCE_COLUMN,
            source.replace('\'', "''"),
            keep
        );
        table
            .delete(&predicate)
            .await
            .map_err(store_error("Failed to remove replaced entries"))?;

        debug!("Replaced entries for {} with {} new ones", source, entries.len());
        Ok(())
    }

    /// Every distinct source that has entries in the index
    #[inline]
    pub async fn sources(&self) -> Result<BTreeSet<String>> {
        let Some(table) = self.open_table().await? else {
            return Ok(BTreeSet::new());
        };

        let mut stream = table
            .query()
            .select(Select::columns(&[SOURCE_COLUMN]))
            .execute()
            .await
            .map_err(store_error("Failed to list sources"))?;

        let mut sources = BTreeSet::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(store_error("Failed to read source stream"))?
        {
            let column = Self::column::<StringArray>(&batch, SOURCE_COLUMN)?;
            sources.extend(column.iter().flatten().map(str::to_string));
        }
        Ok(sources)
    }

    /// Drop every entry and forget the vector dimension
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        self.drop_table_if_exists().await?;
        self.vector_dimension = None;
        info!("Vector index cleared");
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.open_table().await?.is_some() {
            debug!("Dropping index table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(store_error("Failed to drop table"))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .finish()
    }
}
