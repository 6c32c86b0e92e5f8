pub mod convert;
pub mod layout;
pub mod pdf;

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

pub use convert::{to_pdf, CommandConverter, PdfConverter};
pub use pdf::PdfDocument;

/// File kinds a nomination document can be uploaded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Html,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn from_mime(essence: &str) -> Option<Self> {
        match essence {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/html" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Html => "html",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }

    /// Works out the format of a file on disk.
    ///
    /// The extension wins when it is recognised; otherwise the first bytes
    /// are sniffed for a PDF or HTML signature.
    pub fn detect(path: &Path) -> Result<Self, ConvertError> {
        if let Some(format) = mime_guess::from_path(path)
            .iter()
            .find_map(|mime| Self::from_mime(mime.essence_str()))
        {
            return Ok(format);
        }

        let mut head = [0u8; 512];
        let read = std::fs::File::open(path)
            .and_then(|mut f| f.read(&mut head))
            .map_err(|e| ConvertError::ReadDocument {
                path: path.to_path_buf(),
                source: e,
            })?;
        let head = &head[..read];

        if head.starts_with(b"%PDF") {
            return Ok(Self::Pdf);
        }
        let text = String::from_utf8_lossy(head).trim_start().to_lowercase();
        if text.starts_with("<!doctype html") || text.starts_with("<html") {
            return Ok(Self::Html);
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Err(ConvertError::UnsupportedFormat(ext.to_string()))
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| ConvertError::UnsupportedFormat(s.to_string()))
    }
}
