//! External conversion tool configuration.

use serde::{Deserialize, Serialize};

/// Paths and limits for the external command-line tools the conversion
/// handlers shell out to. Defaults are bare command names resolved via
/// `PATH`; point them at absolute paths for pinned installations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// qpdf binary (merge, split, rotate, protect, unlock).
    #[serde(default = "default_qpdf")]
    pub qpdf: String,
    /// Ghostscript binary (compress, watermark).
    #[serde(default = "default_ghostscript")]
    pub ghostscript: String,
    /// pdftoppm binary (PDF page rasterization).
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    /// pdftotext binary (text extraction).
    #[serde(default = "default_pdftotext")]
    pub pdftotext: String,
    /// LibreOffice binary (office format conversions).
    #[serde(default = "default_soffice")]
    pub soffice: String,
    /// Tesseract binary (OCR).
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    /// ImageMagick binary (image to PDF assembly).
    #[serde(default = "default_magick")]
    pub magick: String,
    /// Seconds a single tool invocation may run before being killed.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            qpdf: default_qpdf(),
            ghostscript: default_ghostscript(),
            pdftoppm: default_pdftoppm(),
            pdftotext: default_pdftotext(),
            soffice: default_soffice(),
            tesseract: default_tesseract(),
            magick: default_magick(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_qpdf() -> String {
    "qpdf".to_string()
}

fn default_ghostscript() -> String {
    "gs".to_string()
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

fn default_pdftotext() -> String {
    "pdftotext".to_string()
}

fn default_soffice() -> String {
    "soffice".to_string()
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_magick() -> String {
    "magick".to_string()
}

fn default_timeout() -> u64 {
    300
}
