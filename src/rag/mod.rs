// RAG module
// Retrieval followed by optional generation: the question-answering core of the service

#[cfg(test)]
mod tests;

pub mod prompt;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::indexer::{ScoredChunk, VectorIndex};
use crate::llm::ChatModel;
use crate::{QaError, Result};

/// A retrieved chunk as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// Chunk text, cut to a short preview
    pub content: String,
    pub source: String,
    pub filename: String,
}

impl From<&ScoredChunk> for Source {
    #[inline]
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            content: prompt::preview(&chunk.content),
            source: chunk.source.clone(),
            filename: chunk.filename.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    /// True when no chat model was available and `answer` is the raw context
    pub retrieved_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub status: String,
    pub message: String,
    pub documents: usize,
    pub chunks: usize,
}

/// Shared question-answering state: the embedder and chat model are fixed at
/// startup, the index handle is replaced by rebuilds
pub struct AnswerPipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn ChatModel>>,
    index: RwLock<Option<Arc<VectorIndex>>>,
    rebuild_lock: Mutex<()>,
}

impl AnswerPipeline {
    #[inline]
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        Self {
            config,
            embedder,
            llm,
            index: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// The current index, opening or building it on first use
    #[inline]
    pub async fn ensure_index(&self) -> Result<Arc<VectorIndex>> {
        let current = self.index.read().await.clone();
        if let Some(index) = current {
            return Ok(index);
        }

        let mut slot = self.index.write().await;
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(
            VectorIndex::get_or_create(&self.config, Arc::clone(&self.embedder)).await?,
        );
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Load the index ahead of the first request. Failures are only logged.
    #[inline]
    pub async fn warm_up(&self) {
        match self.ensure_index().await {
            Ok(index) => match index.count().await {
                Ok(chunks) => info!("Vector index ready with {} chunks", chunks),
                Err(e) => warn!("Vector index loaded but could not be counted: {}", e),
            },
            Err(e) => warn!("Skipping warm-up: {}", e),
        }
    }

    /// Answer `question` from the `top_k` (or configured) most similar chunks
    #[inline]
    pub async fn answer_question(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        let k = top_k.unwrap_or(self.config.top_k);
        let index = self.ensure_index().await?;

        let chunks = index
            .similarity_search(question, k, self.config.score_threshold)
            .await?;
        debug!("Answering with {} retrieved chunks (k = {})", chunks.len(), k);

        let context = prompt::format_context(&chunks);
        let sources: Vec<Source> = chunks.iter().map(Source::from).collect();

        let Some(llm) = self.llm.as_ref().map(Arc::clone) else {
            return Ok(Answer {
                answer: format!("{}{}", prompt::RETRIEVAL_ONLY_PREFIX, context),
                sources,
                retrieved_only: true,
            });
        };

        let messages = prompt::build_messages(&context, question);
        let answer = tokio::task::spawn_blocking(move || llm.complete(&messages))
            .await
            .map_err(|e| QaError::Llm(format!("LLM task failed: {}", e)))?
            .map_err(|e| QaError::Llm(format!("{:#}", e)))?;

        Ok(Answer {
            answer,
            sources,
            retrieved_only: false,
        })
    }

    /// Re-index the knowledge base directory and swap in the new index
    #[inline]
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        let _rebuilding = self.rebuild_lock.lock().await;
        info!("Rebuilding knowledge base index");

        let (index, stats) =
            VectorIndex::build_and_persist(&self.config, Arc::clone(&self.embedder), None)
                .await?;
        *self.index.write().await = Some(Arc::new(index));

        Ok(RebuildReport {
            status: "ok".to_string(),
            message: "Knowledge base index rebuilt".to_string(),
            documents: stats.documents,
            chunks: stats.chunks,
        })
    }
}
