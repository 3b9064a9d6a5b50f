// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

/// Name of the single table holding the knowledge base
pub const TABLE_NAME: &str = "knowledge_chunks";

/// Row stored in the chunk table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    /// L2-normalized embedding of `metadata.content`
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Full path of the source document
    pub source: String,
    pub filename: String,
    /// The chunk text
    pub content: String,
    /// Index of this chunk within its document
    pub chunk_index: u32,
    /// RFC 3339 timestamp of the build that wrote the row
    pub created_at: String,
}
