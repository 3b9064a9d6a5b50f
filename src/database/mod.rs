// Database module
// LanceDB storage for chunk vectors and the metadata of their source documents

pub mod lancedb;

pub use self::lancedb::vector_store::{SearchResult, VectorStore};
pub use self::lancedb::{ChunkMetadata, IndexRecord, TABLE_NAME};
