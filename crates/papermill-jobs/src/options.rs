//! Per-operation configuration options.
//!
//! Submissions carry options as flat form fields; each operation kind has
//! one tagged variant with explicit fields. Parsing rejects unknown fields
//! and missing required fields up front, so a worker never sees a malformed
//! option bag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use papermill_core::error::AppError;
use papermill_core::result::AppResult;

use crate::kind::OperationKind;

/// Compression strength for [`OperationKind::Compress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Page selection strategy for [`OperationKind::Split`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    #[default]
    All,
    Range,
    OddEven,
}

/// Odd/even selection within [`SplitMethod::OddEven`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddEven {
    #[default]
    All,
    Odd,
    Even,
}

/// Raster format for [`OperationKind::PdfToImages`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Png,
}

impl ImageFormat {
    /// File extension of the format.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Output format for [`OperationKind::ExtractText`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextOutputFormat {
    #[default]
    Txt,
    Docx,
}

/// Output format for [`OperationKind::Ocr`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrOutputFormat {
    #[default]
    Txt,
    Docx,
    Pdf,
}

/// Page scope for [`OperationKind::Rotate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotatePages {
    #[default]
    All,
    Custom,
}

/// Watermark source for [`OperationKind::Watermark`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    #[default]
    Text,
    Image,
}

/// Parsed, validated options for one submission.
///
/// Exactly one variant per [`OperationKind`]; kinds without options get a
/// unit variant so the match stays exhaustive when a kind is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationOptions {
    Merge {
        /// Comma-separated zero-based input order, already validated.
        order: Option<Vec<usize>>,
    },
    Split {
        split_method: SplitMethod,
        page_range: Option<String>,
        odd_even: OddEven,
    },
    Compress {
        compression_level: CompressionLevel,
    },
    PdfToImages {
        format: ImageFormat,
        dpi: u16,
    },
    ImagesToPdf {
        order: Option<Vec<usize>>,
    },
    PdfToWord,
    PdfToExcel,
    PdfToPpt,
    WordToPdf,
    ExcelToPdf,
    PptToPdf,
    ExtractText {
        output_format: TextOutputFormat,
    },
    Ocr {
        language: String,
        output_format: OcrOutputFormat,
    },
    Rotate {
        angle: u16,
        pages: RotatePages,
        rotate_range: Option<String>,
    },
    Watermark {
        watermark_type: WatermarkKind,
        watermark_text: Option<String>,
        opacity: u8,
        position: String,
    },
    Protect {
        password: String,
        allow_print: bool,
        allow_copy: bool,
        allow_modify: bool,
    },
    Unlock {
        password: String,
    },
}

impl OperationOptions {
    /// Parse and validate the flat field map for one operation kind.
    ///
    /// `input_count` is needed to validate `order` indices. Unknown fields
    /// are rejected so typos fail loudly instead of silently falling back
    /// to defaults.
    pub fn parse(
        kind: OperationKind,
        fields: &HashMap<String, String>,
        input_count: usize,
    ) -> AppResult<Self> {
        let mut fields = FieldMap::new(fields);
        let options = match kind {
            OperationKind::Merge => Self::Merge {
                order: parse_order(fields.take("order"), input_count)?,
            },
            OperationKind::Split => {
                let split_method = match fields.take("split_method") {
                    None | Some("all") => SplitMethod::All,
                    Some("range") => SplitMethod::Range,
                    Some("odd_even") => SplitMethod::OddEven,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid split_method: {other}"
                        )));
                    }
                };
                let page_range = fields.take("page_range").map(str::to_string);
                let odd_even = match fields.take("odd_even") {
                    None | Some("all") => OddEven::All,
                    Some("odd") => OddEven::Odd,
                    Some("even") => OddEven::Even,
                    Some(other) => {
                        return Err(AppError::validation(format!("Invalid odd_even: {other}")));
                    }
                };
                if split_method == SplitMethod::Range
                    && page_range.as_deref().is_none_or(str::is_empty)
                {
                    return Err(AppError::validation(
                        "A page range is required when splitting by range.",
                    ));
                }
                Self::Split {
                    split_method,
                    page_range,
                    odd_even,
                }
            }
            OperationKind::Compress => Self::Compress {
                compression_level: match fields.take("compression_level") {
                    Some("low") => CompressionLevel::Low,
                    None | Some("medium") => CompressionLevel::Medium,
                    Some("high") => CompressionLevel::High,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid compression_level: {other}"
                        )));
                    }
                },
            },
            OperationKind::PdfToImages => {
                let format = match fields.take("format") {
                    None | Some("jpg") => ImageFormat::Jpg,
                    Some("png") => ImageFormat::Png,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid image format: {other}"
                        )));
                    }
                };
                let dpi = match fields.take("dpi") {
                    None => 200,
                    Some(raw) => raw
                        .parse::<u16>()
                        .ok()
                        .filter(|dpi| (72..=600).contains(dpi))
                        .ok_or_else(|| {
                            AppError::validation(format!(
                                "Invalid dpi: {raw} (expected 72-600)"
                            ))
                        })?,
                };
                Self::PdfToImages { format, dpi }
            }
            OperationKind::ImagesToPdf => Self::ImagesToPdf {
                order: parse_order(fields.take("order"), input_count)?,
            },
            OperationKind::PdfToWord => Self::PdfToWord,
            OperationKind::PdfToExcel => Self::PdfToExcel,
            OperationKind::PdfToPpt => Self::PdfToPpt,
            OperationKind::WordToPdf => Self::WordToPdf,
            OperationKind::ExcelToPdf => Self::ExcelToPdf,
            OperationKind::PptToPdf => Self::PptToPdf,
            OperationKind::ExtractText => Self::ExtractText {
                output_format: match fields.take("output_format") {
                    None | Some("txt") => TextOutputFormat::Txt,
                    Some("docx") => TextOutputFormat::Docx,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid output_format: {other}"
                        )));
                    }
                },
            },
            OperationKind::Ocr => Self::Ocr {
                language: fields
                    .take("language")
                    .filter(|lang| !lang.is_empty())
                    .unwrap_or("eng")
                    .to_string(),
                output_format: match fields.take("output_format") {
                    None | Some("txt") => OcrOutputFormat::Txt,
                    Some("docx") => OcrOutputFormat::Docx,
                    Some("pdf") => OcrOutputFormat::Pdf,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid output_format: {other}"
                        )));
                    }
                },
            },
            OperationKind::Rotate => {
                let angle = match fields.take("angle") {
                    None => 90,
                    Some("90") => 90,
                    Some("180") => 180,
                    Some("270") => 270,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid angle: {other} (expected 90, 180 or 270)"
                        )));
                    }
                };
                let pages = match fields.take("pages") {
                    None | Some("all") => RotatePages::All,
                    Some("custom") => RotatePages::Custom,
                    Some(other) => {
                        return Err(AppError::validation(format!("Invalid pages: {other}")));
                    }
                };
                let rotate_range = fields.take("rotate_range").map(str::to_string);
                if pages == RotatePages::Custom
                    && rotate_range.as_deref().is_none_or(str::is_empty)
                {
                    return Err(AppError::validation(
                        "A page range is required when rotating custom pages.",
                    ));
                }
                Self::Rotate {
                    angle,
                    pages,
                    rotate_range,
                }
            }
            OperationKind::Watermark => {
                let watermark_type = match fields.take("watermark_type") {
                    None | Some("text") => WatermarkKind::Text,
                    Some("image") => WatermarkKind::Image,
                    Some(other) => {
                        return Err(AppError::validation(format!(
                            "Invalid watermark_type: {other}"
                        )));
                    }
                };
                let watermark_text = fields.take("watermark_text").map(str::to_string);
                if watermark_type == WatermarkKind::Text
                    && watermark_text.as_deref().is_none_or(str::is_empty)
                {
                    return Err(AppError::validation("Watermark text is required."));
                }
                let opacity = match fields.take("opacity") {
                    None => 30,
                    Some(raw) => raw
                        .parse::<u8>()
                        .ok()
                        .filter(|o| *o <= 100)
                        .ok_or_else(|| {
                            AppError::validation(format!(
                                "Invalid opacity: {raw} (expected 0-100)"
                            ))
                        })?,
                };
                let position = fields
                    .take("position")
                    .filter(|p| !p.is_empty())
                    .unwrap_or("middle-center")
                    .to_string();
                Self::Watermark {
                    watermark_type,
                    watermark_text,
                    opacity,
                    position,
                }
            }
            OperationKind::Protect => {
                let password = fields
                    .take("password")
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| AppError::validation("Password is required."))?
                    .to_string();
                let confirm = fields.take("confirm_password").unwrap_or_default();
                if confirm != password {
                    return Err(AppError::validation("Passwords do not match."));
                }
                Self::Protect {
                    password,
                    allow_print: parse_flag(fields.take("allow_print")),
                    allow_copy: parse_flag(fields.take("allow_copy")),
                    allow_modify: parse_flag(fields.take("allow_modify")),
                }
            }
            OperationKind::Unlock => Self::Unlock {
                password: fields
                    .take("password")
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| AppError::validation("Password is required."))?
                    .to_string(),
            },
        };
        fields.finish()?;
        Ok(options)
    }
}

/// Field map that tracks which keys were consumed, so leftovers can be
/// rejected as unknown.
struct FieldMap<'a> {
    fields: &'a HashMap<String, String>,
    consumed: Vec<&'a str>,
}

impl<'a> FieldMap<'a> {
    fn new(fields: &'a HashMap<String, String>) -> Self {
        Self {
            fields,
            consumed: Vec::new(),
        }
    }

    fn take(&mut self, key: &'static str) -> Option<&'a str> {
        self.consumed.push(key);
        self.fields.get(key).map(String::as_str)
    }

    fn finish(self) -> AppResult<()> {
        let mut unknown: Vec<&str> = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|key| !self.consumed.contains(key))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();
        Err(AppError::validation(format!(
            "Unknown option field(s): {}",
            unknown.join(", ")
        )))
    }
}

/// Parse a comma-separated list of zero-based indices covering every input
/// exactly once. An absent or empty value means "keep submission order";
/// anything malformed is rejected rather than ignored.
fn parse_order(raw: Option<&str>, input_count: usize) -> AppResult<Option<Vec<usize>>> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };
    let indices: Vec<usize> = raw
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| AppError::validation(format!("Invalid file order: {raw}")))?;

    let mut seen = vec![false; input_count];
    if indices.len() != input_count
        || !indices.iter().all(|&i| {
            i < input_count && !std::mem::replace(&mut seen[i], true)
        })
    {
        return Err(AppError::validation(format!("Invalid file order: {raw}")));
    }
    Ok(Some(indices))
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("true") | Some("on") | Some("1") | Some("yes"))
}
