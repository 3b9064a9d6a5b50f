
use super::{ChunkMetadata, IndexRecord, TABLE_NAME};
use crate::QaError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Dimension of the placeholder table written when there is nothing to embed
pub const PLACEHOLDER_DIMENSION: usize = 768;

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
    table_name: String,
    vector_dimension: Option<usize>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_metadata: ChunkMetadata,
    /// Cosine similarity, `1 - distance`
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Open (or create) the store at `db_path`.
    ///
    /// A directory LanceDB reports as corrupt is moved aside and recreated
    /// empty. An unreadable table is dropped so the next build starts fresh.
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self, QaError> {
        debug!("Initializing LanceDB at path: {}", db_path.display());

        fs::create_dir_all(db_path).map_err(|e| {
            QaError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().into_owned();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                if looks_corrupted(&e.to_string()) {
                    warn!("Database corruption detected, attempting recovery");
                    attempt_corruption_recovery(db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        QaError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(QaError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        let mut store = Self {
            connection,
            path: db_path.to_path_buf(),
            table_name: TABLE_NAME.to_string(),
            vector_dimension: None,
        };

        store.load_table_with_recovery().await?;

        info!("Vector store opened at {}", db_path.display());
        Ok(store)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimension of the stored vectors, when the table exists
    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    /// Whether the chunk table has been written
    #[inline]
    pub async fn has_table(&self) -> Result<bool, QaError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn load_table(&mut self) -> Result<(), QaError> {
        if !self.has_table().await? {
            debug!("No {} table yet", self.table_name);
            self.vector_dimension = None;
            return Ok(());
        }

        let dimension = self.detect_existing_vector_dimension().await?;
        info!("Detected existing vector dimension: {}", dimension);
        self.vector_dimension = Some(dimension);
        Ok(())
    }

    async fn load_table_with_recovery(&mut self) -> Result<(), QaError> {
        match self.load_table().await {
            Ok(()) => Ok(()),
            Err(e) if looks_corrupted(&e.to_string()) || e.to_string().contains("schema") => {
                warn!("Table corruption detected while opening: {}", e);

                if let Err(drop_err) = self.drop_table_if_exists().await {
                    warn!("Failed to drop corrupted table: {}", drop_err);
                }
                self.vector_dimension = None;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize, QaError> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| QaError::Database(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                QaError::Database(
                    "Invalid schema: could not find vector column or determine dimension"
                        .to_string(),
                )
            })
    }

    async fn open_table(&self) -> Result<lancedb::Table, QaError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to open table: {}", e)))
    }

    /// Replace the whole table with `records`, all of dimension `vector_dim`
    #[inline]
    pub async fn replace_all(
        &mut self,
        records: &[IndexRecord],
        vector_dim: usize,
    ) -> Result<(), QaError> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(QaError::Database(format!(
                "Record {} has dimension {}, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        self.drop_table_if_exists().await?;
        self.vector_dimension = None;

        self.connection
            .create_empty_table(&self.table_name, create_schema(vector_dim)?)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to create table: {}", e)))?;
        self.vector_dimension = Some(vector_dim);

        if records.is_empty() {
            info!("Created empty {} table", self.table_name);
            return Ok(());
        }

        let record_batch = create_record_batch(records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to insert chunks: {}", e)))?;

        info!("Stored {} chunks with {} dimensions", records.len(), vector_dim);
        Ok(())
    }

    /// Cosine nearest neighbours of `query_vector`, closest first.
    ///
    /// Results whose similarity falls below `score_threshold` are dropped. A
    /// missing or empty table yields no results.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>, QaError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 || !self.has_table().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {}", e)))?;
        if rows == 0 {
            debug!("Index is empty");
            return Ok(Vec::new());
        }

        if let Some(dimension) = self.vector_dimension {
            if dimension != query_vector.len() {
                return Err(QaError::Database(format!(
                    "Query vector has {} dimensions but the index stores {}; rebuild the index",
                    query_vector.len(),
                    dimension
                )));
            }
        }

        let results = table
            .vector_search(query_vector)
            .map_err(|e| QaError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to execute search: {}", e)))?;

        let mut found = parse_search_results_stream(results).await?;
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        if let Some(threshold) = score_threshold {
            found.retain(|result| result.similarity_score >= threshold);
        }

        debug!("Search returned {} results", found.len());
        Ok(found)
    }

    /// Number of stored chunks; zero when the table does not exist
    #[inline]
    pub async fn count(&self) -> Result<usize, QaError> {
        if !self.has_table().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {}", e)))
    }

    async fn drop_table_if_exists(&self) -> Result<(), QaError> {
        if self.has_table().await? {
            info!("Dropping existing {} table", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| QaError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    /// Check that the table exists and can be read
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool, QaError> {
        debug!("Validating database integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.contains(&self.table_name) {
            warn!("{} table missing during integrity check", self.table_name);
            return Ok(false);
        }

        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Database integrity check passed, {} rows found", count);
                    Ok(true)
                }
                Err(e) => {
                    error!("Failed to count rows during integrity check: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                Ok(false)
            }
        }
    }
}

fn looks_corrupted(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("corrupt") || message.contains("invalid") || message.contains("malformed")
}

/// Move an unreadable database directory aside
fn attempt_corruption_recovery(db_path: &Path) -> Result<(), QaError> {
    warn!(
        "Attempting database corruption recovery at {}",
        db_path.display()
    );

    if db_path.exists() {
        let backup_path = db_path.with_extension("corrupted_backup");
        if let Err(e) = fs::rename(db_path, &backup_path) {
            error!("Failed to backup corrupted database: {}", e);
        } else {
            info!(
                "Corrupted database backed up to {}",
                backup_path.display()
            );
        }
    }

    if db_path.exists() {
        fs::remove_dir_all(db_path).map_err(|e| {
            QaError::Database(format!("Failed to remove corrupted database: {}", e))
        })?;
    }
    fs::create_dir_all(db_path)?;

    info!("Database corruption recovery completed");
    Ok(())
}

fn vector_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, false))
}

fn list_size(vector_dim: usize) -> Result<i32, QaError> {
    i32::try_from(vector_dim)
        .map_err(|_| QaError::Database(format!("Vector dimension {} is too large", vector_dim)))
}

fn create_schema(vector_dim: usize) -> Result<Arc<Schema>, QaError> {
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(vector_field(), list_size(vector_dim)?),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

fn create_record_batch(records: &[IndexRecord], vector_dim: usize) -> Result<RecordBatch, QaError> {
    let flat_values: Vec<f32> = records
        .iter()
        .flat_map(|record| record.vector.iter().copied())
        .collect();
    let vector_array = FixedSizeListArray::try_new(
        vector_field(),
        list_size(vector_dim)?,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| QaError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.id.as_str()),
        )),
        Arc::new(vector_array),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.source.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.filename.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.content.as_str()),
        )),
        Arc::new(UInt32Array::from_iter_values(
            records.iter().map(|r| r.metadata.chunk_index),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.created_at.as_str()),
        )),
    ];

    RecordBatch::try_new(create_schema(vector_dim)?, arrays)
        .map_err(|e| QaError::Database(format!("Failed to create record batch: {}", e)))
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<SearchResult>, QaError> {
    let mut search_results = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| QaError::Database(format!("Failed to read result stream: {}", e)))?
    {
        search_results.extend(parse_search_batch(&batch)?);
    }

    Ok(search_results)
}

fn typed_column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QaError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, QaError> {
    let sources = typed_column::<StringArray>(batch, "source")?;
    let filenames = typed_column::<StringArray>(batch, "filename")?;
    let contents = typed_column::<StringArray>(batch, "content")?;
    let chunk_indices = typed_column::<UInt32Array>(batch, "chunk_index")?;
    let created_ats = typed_column::<StringArray>(batch, "created_at")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let results = (0..batch.num_rows())
        .map(|row| {
            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            SearchResult {
                chunk_metadata: ChunkMetadata {
                    source: sources.value(row).to_string(),
                    filename: filenames.value(row).to_string(),
                    content: contents.value(row).to_string(),
                    chunk_index: chunk_indices.value(row),
                    created_at: created_ats.value(row).to_string(),
                },
                similarity_score: 1.0 - distance,
                distance,
            }
        })
        .collect();

    Ok(results)
}
