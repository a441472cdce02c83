//! Document extraction: source bytes + file name → normalised plain text.
//!
//! Dispatches on the file extension (case-insensitive). DOCX/DOCM are
//! unpacked locally; PDF goes through a pluggable engine so the desk can
//! swap converters without touching ingestion; TXT is passed through.
//! Every path ends in the same normalisation: UTF-8, `\n` paragraph
//! breaks, no carriage returns, collapsed whitespace runs.

pub mod docx;
pub mod text;

pub use text::normalize_text;

use thiserror::Error;

use crate::models::SourceFormat;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("no text could be extracted; the document appears empty")]
    Empty,

    #[error("extraction failed: {detail}")]
    ExtractFailed { detail: String },
}

impl ExtractError {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::ExtractFailed {
            detail: detail.into(),
        }
    }
}

/// Pluggable PDF text engine. Implementations must preserve layout
/// well enough that clause headings stay on their own lines.
pub trait PdfTextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Front door for document extraction.
pub struct DocumentExtractor {
    pdf: Option<Box<dyn PdfTextExtractor>>,
}

impl DocumentExtractor {
    /// Extractor without a PDF engine; PDF input fails with a clear
    /// detail until one is plugged in.
    pub fn new() -> Self {
        Self { pdf: None }
    }

    pub fn with_pdf(pdf: Box<dyn PdfTextExtractor>) -> Self {
        Self { pdf: Some(pdf) }
    }

    /// Extract and normalise text from `bytes` named `file_name`.
    pub fn extract(&self, bytes: &[u8], file_name: &str) -> Result<String, ExtractError> {
        let format = SourceFormat::from_file_name(file_name)
            .ok_or_else(|| ExtractError::UnsupportedFormat(file_name.to_string()))?;

        if bytes.is_empty() {
            return Err(ExtractError::Empty);
        }

        let raw = match format {
            SourceFormat::Txt => String::from_utf8_lossy(bytes).into_owned(),
            SourceFormat::Docx | SourceFormat::Docm => docx::extract_docx(bytes)?,
            SourceFormat::Pdf => match &self.pdf {
                Some(engine) => engine.extract(bytes)?,
                None => {
                    return Err(ExtractError::failed("no PDF engine configured"));
                }
            },
        };

        let normalized = normalize_text(&raw);
        if normalized.trim().is_empty() {
            return Err(ExtractError::Empty);
        }

        tracing::debug!(
            file_name,
            format = format.as_str(),
            chars = normalized.len(),
            "extracted document text"
        );
        Ok(normalized)
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}
