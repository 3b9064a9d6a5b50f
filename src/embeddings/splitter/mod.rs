
use tracing::{debug, warn};

use crate::loader::{Document, DocumentMetadata};
use crate::{QaError, Result};

/// Boundaries tried in order, from paragraphs down to single characters
pub const DEFAULT_SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", "；", ". ", "! ", "? ", " ", "",
];

/// A piece of a document ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    /// Metadata of the document the chunk was cut from
    pub metadata: DocumentMetadata,
    /// Position of the chunk within its document
    pub chunk_index: usize,
}

/// Recursive boundary-seeking splitter with character-based sizes
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(QaError::Config("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(QaError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
        })
    }

    #[inline]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty chunks
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document, numbering chunks from zero within each document
    #[inline]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let pieces = self.split_text(&document.content);
            debug!(
                "Split {} into {} chunks",
                document.metadata.filename,
                pieces.len()
            );

            chunks.extend(
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, content)| Chunk {
                        content,
                        metadata: document.metadata.clone(),
                        chunk_index,
                    }),
            );
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let pieces = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge_pieces(&short_pieces));
                short_pieces.clear();
            }

            if remaining.is_empty() {
                if let Some(chunk) = trimmed(piece) {
                    chunks.push(chunk);
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !short_pieces.is_empty() {
            chunks.extend(self.merge_pieces(&short_pieces));
        }

        chunks
    }

    /// Greedily join pieces up to `chunk_size`, carrying a tail of at most
    /// `chunk_overlap` characters into the next chunk
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<(&str, usize)> = Vec::new();
        let mut window_len = 0;
        let mut front = 0;

        for &piece in pieces {
            let piece_len = char_len(piece);

            if window_len + piece_len > self.chunk_size && front < window.len() {
                if window_len > self.chunk_size {
                    warn!(
                        "Created a chunk of {} characters, longer than the limit of {}",
                        window_len, self.chunk_size
                    );
                }

                if let Some(chunk) = join_window(window.get(front..).unwrap_or_default()) {
                    chunks.push(chunk);
                }

                while front < window.len()
                    && (window_len > self.chunk_overlap
                        || (window_len + piece_len > self.chunk_size && window_len > 0))
                {
                    window_len -= window.get(front).map_or(0, |&(_, len)| len);
                    front += 1;
                }
            }

            window.push((piece, piece_len));
            window_len += piece_len;
        }

        if let Some(chunk) = join_window(window.get(front..).unwrap_or_default()) {
            chunks.push(chunk);
        }

        chunks
    }
}

/// First separator found in `text` plus the lower-priority ones after it.
/// An empty separator always matches and splits into characters; when nothing
/// matches the last separator is used with nothing left to fall back on.
fn pick_separator<'s>(text: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (
                separator.as_str(),
                separators.get(i + 1..).unwrap_or_default(),
            );
        }
    }

    (separators.last().map_or("", String::as_str), &[])
}

/// Split at each occurrence of `separator`, keeping the separator at the start
/// of the following piece. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text.split_inclusive(|_: char| true).collect();
    }

    let mut pieces = Vec::new();
    let mut rest = text;
    let mut search_from = 0;

    while let Some(position) = rest
        .get(search_from..)
        .and_then(|tail| tail.find(separator))
    {
        let (piece, tail) = rest.split_at(search_from + position);
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = tail;
        search_from = separator.len();
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }

    pieces
}

fn join_window(window: &[(&str, usize)]) -> Option<String> {
    let joined: String = window.iter().map(|&(piece, _)| piece).collect();
    trimmed(&joined)
}

fn trimmed(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}
