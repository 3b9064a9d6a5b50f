// Document loader
// Reads supported files from the knowledge base directory into text documents

#[cfg(test)]
mod tests;

pub mod formats;

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub use formats::{DocumentFormat, SUPPORTED_EXTENSIONS};

/// A loaded document with the metadata of its source file
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Full path of the source file
    pub source: String,
    /// File name of the source file
    pub filename: String,
}

impl Document {
    #[inline]
    pub fn new(content: String, path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            content,
            metadata: DocumentMetadata {
                source: path.display().to_string(),
                filename,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Unsupported file format: {0}")]
    Unsupported(String),
    #[error("Could not decode text as UTF-8 or GBK")]
    Encoding,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load a single file. Returns `Ok(None)` when the file holds no text.
#[inline]
pub fn load_file(path: &Path) -> Result<Option<Document>, LoaderError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        LoaderError::Unsupported(
            path.extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })?;

    let text = format.read(path)?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(Document::new(text, path)))
}

/// Recursively load every supported document below `directory`.
///
/// Unreadable, unsupported or empty files are logged and skipped; a single bad
/// file never aborts the load.
#[inline]
pub fn load_documents_from_directory(directory: &Path) -> Vec<Document> {
    if !directory.is_dir() {
        warn!(
            "Directory does not exist or is not a directory: {}",
            directory.display()
        );
        return Vec::new();
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(directory).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        if DocumentFormat::from_path(path).is_none() {
            continue;
        }

        match load_file(path) {
            Ok(Some(document)) => {
                info!(
                    "Loaded {} ({} characters)",
                    document.metadata.filename,
                    document.content.chars().count()
                );
                documents.push(document);
            }
            Ok(None) => debug!("Skipping empty file: {}", path.display()),
            Err(LoaderError::Unsupported(reason)) => {
                warn!("Skipping {}: {}", path.display(), reason);
            }
            Err(e) => error!("Failed to load file {}: {}", path.display(), e),
        }
    }

    info!(
        "Loaded {} documents from {}",
        documents.len(),
        directory.display()
    );
    documents
}
