//! The closed set of supported file-transform operations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unrecognized operation name.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

/// How many artifacts an operation is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// Exactly one artifact.
    Single,
    /// One artifact per page plus a zip bundling them all.
    ManyWithArchive,
}

/// One supported file-transform category.
///
/// Every kind declares its wire name, artifact naming tag, acknowledgment
/// verb, and input arity. Adding a kind means adding it here, to the option
/// parser, and registering a handler; the registry rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Merge,
    Split,
    Compress,
    PdfToImages,
    ImagesToPdf,
    PdfToWord,
    PdfToExcel,
    PdfToPpt,
    WordToPdf,
    ExcelToPdf,
    PptToPdf,
    ExtractText,
    Ocr,
    Rotate,
    Watermark,
    Protect,
    Unlock,
}

impl OperationKind {
    /// All kinds, in registry order.
    pub const ALL: [OperationKind; 17] = [
        Self::Merge,
        Self::Split,
        Self::Compress,
        Self::PdfToImages,
        Self::ImagesToPdf,
        Self::PdfToWord,
        Self::PdfToExcel,
        Self::PdfToPpt,
        Self::WordToPdf,
        Self::ExcelToPdf,
        Self::PptToPdf,
        Self::ExtractText,
        Self::Ocr,
        Self::Rotate,
        Self::Watermark,
        Self::Protect,
        Self::Unlock,
    ];

    /// Wire name used in submission URLs and the event `tool` field.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Compress => "compress",
            Self::PdfToImages => "pdf_to_images",
            Self::ImagesToPdf => "images_to_pdf",
            Self::PdfToWord => "pdf_to_word",
            Self::PdfToExcel => "pdf_to_excel",
            Self::PdfToPpt => "pdf_to_ppt",
            Self::WordToPdf => "word_to_pdf",
            Self::ExcelToPdf => "excel_to_pdf",
            Self::PptToPdf => "ppt_to_pdf",
            Self::ExtractText => "extract_text",
            Self::Ocr => "ocr",
            Self::Rotate => "rotate",
            Self::Watermark => "watermark",
            Self::Protect => "protect",
            Self::Unlock => "unlock",
        }
    }

    /// Tag inserted into artifact names: `{base}_{tag}_{shortid}.{ext}`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Merge => "merged",
            Self::Split => "split",
            Self::Compress => "compressed",
            Self::PdfToImages => "images",
            Self::ImagesToPdf => "combined",
            Self::PdfToWord => "word",
            Self::PdfToExcel => "excel",
            Self::PdfToPpt => "ppt",
            Self::WordToPdf | Self::ExcelToPdf | Self::PptToPdf => "converted",
            Self::ExtractText => "text",
            Self::Ocr => "ocr",
            Self::Rotate => "rotated",
            Self::Watermark => "watermarked",
            Self::Protect => "protected",
            Self::Unlock => "unlocked",
        }
    }

    /// Message returned in the immediate "processing" acknowledgment.
    pub fn ack_message(&self) -> &'static str {
        match self {
            Self::Merge => "Merging PDFs...",
            Self::Split => "Splitting PDF...",
            Self::Compress => "Compressing PDF...",
            Self::PdfToImages => "Converting PDF to images...",
            Self::ImagesToPdf => "Converting images to PDF...",
            Self::PdfToWord => "Converting PDF to Word...",
            Self::PdfToExcel => "Converting PDF to Excel...",
            Self::PdfToPpt => "Converting PDF to PowerPoint...",
            Self::WordToPdf => "Converting Word to PDF...",
            Self::ExcelToPdf => "Converting Excel to PDF...",
            Self::PptToPdf => "Converting PowerPoint to PDF...",
            Self::ExtractText => "Extracting text...",
            Self::Ocr => "Performing OCR...",
            Self::Rotate => "Rotating PDF...",
            Self::Watermark => "Adding watermark...",
            Self::Protect => "Protecting PDF...",
            Self::Unlock => "Unlocking PDF...",
        }
    }

    /// Minimum number of input files the kind requires.
    pub fn min_inputs(&self) -> usize {
        match self {
            Self::Merge => 2,
            _ => 1,
        }
    }

    /// Validation message when no input (or too few inputs) arrived.
    pub fn missing_input_message(&self) -> &'static str {
        match self {
            Self::Merge => "At least 2 PDF files are required for merging.",
            Self::ImagesToPdf => "No image files were uploaded.",
            Self::WordToPdf => "No Word file was uploaded.",
            Self::ExcelToPdf => "No Excel file was uploaded.",
            Self::PptToPdf => "No PowerPoint file was uploaded.",
            _ => "No PDF file was uploaded.",
        }
    }

    /// Expected output artifact count.
    pub fn output_shape(&self) -> OutputShape {
        match self {
            Self::Split | Self::PdfToImages => OutputShape::ManyWithArchive,
            _ => OutputShape::Single,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.wire_name() == s)
            .copied()
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
