use std::fs::{self, File};
use std::io::Read;
use std::panic;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use super::LoaderError;

/// Extensions (lower case, without the dot) recognised by the loader
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "pdf", "docx", "doc"];

const DOCX_BODY_PATH: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.txt`, `.md` and `.markdown`
    PlainText,
    Pdf,
    Docx,
    /// Legacy binary Word files, recognised so they can be reported
    LegacyDoc,
}

impl DocumentFormat {
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "md" | "markdown" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::LegacyDoc),
            _ => None,
        }
    }

    /// Extract the text of `path`
    #[inline]
    pub fn read(self, path: &Path) -> Result<String, LoaderError> {
        match self {
            Self::PlainText => read_text(path),
            Self::Pdf => read_pdf(path),
            Self::Docx => read_docx(path),
            Self::LegacyDoc => Err(LoaderError::Unsupported(
                "legacy .doc files cannot be read, convert the file to .docx".to_string(),
            )),
        }
    }
}

/// Read a text file as UTF-8, falling back to GBK
fn read_text(path: &Path) -> Result<String, LoaderError> {
    let bytes = fs::read(path)?;
    decode_text(bytes)
}

pub(crate) fn decode_text(bytes: Vec<u8>) -> Result<String, LoaderError> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text.trim_start_matches('\u{feff}').to_string()),
        Err(e) => {
            let bytes = e.into_bytes();
            let (text, _, had_errors) = encoding_rs::GBK.decode(&bytes);
            if had_errors {
                return Err(LoaderError::Encoding);
            }
            Ok(text.into_owned())
        }
    }
}

fn read_pdf(path: &Path) -> Result<String, LoaderError> {
    // pdf-extract panics on some malformed files
    match panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(LoaderError::Pdf(e.to_string())),
        Err(_) => Err(LoaderError::Pdf("parser panicked".to_string())),
    }
}

fn read_docx(path: &Path) -> Result<String, LoaderError> {
    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| LoaderError::Docx(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY_PATH)
        .map_err(|e| LoaderError::Docx(e.to_string()))?
        .read_to_string(&mut xml)?;

    docx_paragraphs(&xml)
        .map(|paragraphs| paragraphs.join("\n\n"))
        .map_err(|e| LoaderError::Docx(e.to_string()))
}

/// Collect the non-blank paragraph texts of a WordprocessingML body
pub(crate) fn docx_paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) if element.local_name().as_ref() == b"t" => in_text = true,
            Event::End(element) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(current.clone());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(text) if in_text => current.push_str(&text.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}
