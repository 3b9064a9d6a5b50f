// Indexer module
// Builds the persisted vector index from the knowledge base and answers similarity queries


use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::lancedb::vector_store::PLACEHOLDER_DIMENSION;
use crate::database::{ChunkMetadata, IndexRecord, VectorStore};
use crate::embeddings::{Chunk, Embedder, RecursiveSplitter};
use crate::loader::{Document, load_documents_from_directory};
use crate::{QaError, Result};

/// Persisted chunk vectors paired with the embedder that produced them
pub struct VectorIndex {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
}

/// Outcome of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
}

/// A retrieved chunk with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub content: String,
    pub source: String,
    pub filename: String,
    pub chunk_index: u32,
    pub score: f32,
}

impl VectorIndex {
    /// Embed `documents` (or everything in the knowledge base when `None`) and
    /// replace the persisted index with the result
    #[inline]
    pub async fn build_and_persist(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        documents: Option<Vec<Document>>,
    ) -> Result<(Self, IndexStats)> {
        let documents = match documents {
            Some(documents) => documents,
            None => {
                let directory = config
                    .knowledge_path()
                    .map_err(|e| QaError::Config(e.to_string()))?;
                info!("Loading documents from {}", directory.display());
                tokio::task::spawn_blocking(move || load_documents_from_directory(&directory))
                    .await
                    .map_err(|e| QaError::Loader(format!("Document loading task failed: {}", e)))?
            }
        };

        let splitter = RecursiveSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let chunks = splitter.split_documents(&documents);
        info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let mut store = VectorStore::open(&config.index_path()).await?;

        if chunks.is_empty() {
            warn!(
                "No documents to index in {}; the index will be empty",
                config.get_base_dir().join(&config.knowledge_base_path).display()
            );
            store.replace_all(&[], PLACEHOLDER_DIMENSION).await?;
        } else {
            let batch_size = config.embedding_batch_size.max(1) as usize;
            let vectors = embed_chunks(&embedder, &chunks, batch_size).await?;
            let records = build_records(chunks.iter().zip(vectors))?;
            let dimension = records.first().map_or(0, |r| r.vector.len());
            store.replace_all(&records, dimension).await?;
        }

        let stats = IndexStats {
            documents: documents.len(),
            chunks: chunks.len(),
        };
        info!(
            "Index built: {} documents, {} chunks",
            stats.documents, stats.chunks
        );

        Ok((Self { store, embedder }, stats))
    }

    /// Open the persisted index, building it first when it does not exist
    #[inline]
    pub async fn get_or_create(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = VectorStore::open(&config.index_path()).await?;

        if store.has_table().await? {
            info!(
                "Loaded existing index with {} chunks from {}",
                store.count().await?,
                store.path().display()
            );
            return Ok(Self { store, embedder });
        }

        info!("No persisted index found, building a new one");
        drop(store);
        let (index, _) = Self::build_and_persist(config, embedder, None).await?;
        Ok(index)
    }

    /// The `k` chunks closest to `question`, best first
    #[inline]
    pub async fn similarity_search(
        &self,
        question: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        let query = question.to_string();
        let vector = run_embedder(&self.embedder, move |embedder| embedder.embed_query(&query))
            .await?;

        let results = self.store.search(&vector, k, score_threshold).await?;
        debug!("Retrieved {} chunks for question", results.len());

        Ok(results
            .into_iter()
            .map(|result| ScoredChunk {
                content: result.chunk_metadata.content,
                source: result.chunk_metadata.source,
                filename: result.chunk_metadata.filename,
                chunk_index: result.chunk_metadata.chunk_index,
                score: result.similarity_score,
            })
            .collect())
    }

    /// Number of indexed chunks
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }
}

async fn embed_chunks(
    embedder: &Arc<dyn Embedder>,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new(chunks.len() as u64).with_style(
            ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    };

    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let expected = texts.len();

        let batch_vectors =
            run_embedder(embedder, move |embedder| embedder.embed_documents(&texts)).await?;
        if batch_vectors.len() != expected {
            bar.abandon();
            return Err(QaError::Embedding(format!(
                "Expected {} vectors, got {}",
                expected,
                batch_vectors.len()
            )));
        }

        vectors.extend(batch_vectors);
        bar.inc(expected as u64);
    }

    bar.finish_and_clear();
    Ok(vectors)
}

fn build_records<'a>(
    embedded: impl Iterator<Item = (&'a Chunk, Vec<f32>)>,
) -> Result<Vec<IndexRecord>> {
    let created_at = Utc::now().to_rfc3339();
    let mut dimension = None;

    embedded
        .map(|(chunk, vector)| {
            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected || expected == 0 {
                return Err(QaError::Embedding(format!(
                    "Embedding of {} chunk {} has {} dimensions, expected {}",
                    chunk.metadata.filename,
                    chunk.chunk_index,
                    vector.len(),
                    expected
                )));
            }

            Ok(IndexRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                metadata: ChunkMetadata {
                    source: chunk.metadata.source.clone(),
                    filename: chunk.metadata.filename.clone(),
                    content: chunk.content.clone(),
                    chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
                    created_at: created_at.clone(),
                },
            })
        })
        .collect()
}

/// Run a blocking embedder call on the blocking thread pool
async fn run_embedder<T, F>(embedder: &Arc<dyn Embedder>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Embedder) -> anyhow::Result<T> + Send + 'static,
{
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || f(embedder.as_ref()))
        .await
        .map_err(|e| QaError::Embedding(format!("Embedding task failed: {}", e)))?
        .map_err(|e| QaError::Embedding(format!("{:#}", e)))
}
