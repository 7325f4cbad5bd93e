//! Text extraction and OCR.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::options::{OcrOutputFormat, TextOutputFormat};
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};
use papermill_store::Artifact;

use crate::command::ToolCommand;

use super::{adopt_file, list_produced, wrap};

/// Render pages at this resolution before OCR.
const OCR_DPI: u16 = 300;

/// Extracts the text layer of a PDF via pdftotext, optionally converting
/// the result to a Word document.
pub struct ExtractTextHandler {
    tools: Arc<ToolsConfig>,
}

impl ExtractTextHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for ExtractTextHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::ExtractText
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error extracting text";
        let OperationOptions::ExtractText { output_format } = &ctx.options else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting text extraction process...");

        let input = &ctx.inputs[0];
        let scratch = ctx
            .store
            .scratch_dir(&ctx.job_id)
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        let text_path = scratch.join("extracted.txt");

        ctx.progress.update("Reading PDF...", 20);
        ctx.progress.update("Extracting text...", 40);
        ToolCommand::new(&self.tools.pdftotext, self.tools.timeout_secs)
            .arg("-layout")
            .arg_path(&input.path)
            .arg_path(&text_path)
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        let text = tokio::fs::read_to_string(&text_path)
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        if text.trim().is_empty() {
            return Err(HandlerError::new(
                "No text could be extracted from the PDF.",
            ));
        }

        ctx.progress.update("Creating output files...", 80);
        let base = ctx.base_name();
        let tag = OperationKind::ExtractText.tag();
        let (extracted, label) = match output_format {
            TextOutputFormat::Txt => {
                let slot = ctx.store.allocate_output(&ctx.job_id, &base, tag, "txt");
                let artifact = ctx
                    .store
                    .write_output(slot, Bytes::from(text.clone()))
                    .await
                    .map_err(|e| wrap(CONTEXT, e))?;
                (artifact, "Text File (.txt)")
            }
            TextOutputFormat::Docx => {
                let produced =
                    text_to_docx(&self.tools, &scratch, &text_path, CONTEXT).await?;
                let slot = ctx.store.allocate_output(&ctx.job_id, &base, tag, "docx");
                (
                    adopt_file(&ctx.store, &produced, slot).await?,
                    "Word Document (.docx)",
                )
            }
        };

        Ok(HandlerOutcome {
            message: "Text extracted successfully!".to_string(),
            downloads: vec![extracted.to_descriptor(label)],
            log_entry: format!(
                "Extracted {} characters from {}",
                text.chars().count(),
                input.name
            ),
        })
    }
}

/// Recognizes text in a PDF or image via Tesseract, producing plain text,
/// a Word document, or a searchable PDF.
pub struct OcrHandler {
    tools: Arc<ToolsConfig>,
}

impl OcrHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }

    /// Rasterize a PDF input, or pass an image input through as a single
    /// page.
    async fn prepare_pages(
        &self,
        ctx: &HandlerContext,
        input: &Artifact,
        scratch: &std::path::Path,
        context: &str,
    ) -> Result<Vec<PathBuf>, HandlerError> {
        let is_pdf = input
            .name
            .rsplit('.')
            .next()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Ok(vec![input.path.clone()]);
        }

        ctx.progress.update("Converting PDF to images...", 20);
        ToolCommand::new(&self.tools.pdftoppm, self.tools.timeout_secs)
            .arg("-png")
            .arg("-r")
            .arg(OCR_DPI.to_string())
            .arg_path(&input.path)
            .arg_path(scratch.join("ocr_page"))
            .run()
            .await
            .map_err(|e| wrap(context, e))?;

        let pages = list_produced(scratch, "ocr_page").await?;
        if pages.is_empty() {
            return Err(HandlerError::new(
                "No pages could be rasterized for OCR.",
            ));
        }
        Ok(pages)
    }

    fn tesseract(&self) -> ToolCommand {
        ToolCommand::new(&self.tools.tesseract, self.tools.timeout_secs)
    }
}

#[async_trait]
impl OperationHandler for OcrHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Ocr
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error performing OCR";
        let OperationOptions::Ocr {
            language,
            output_format,
        } = &ctx.options
        else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        if !is_valid_language(language) {
            return Err(HandlerError::new(format!("Invalid OCR language: {language}")));
        }
        ctx.progress.log("Starting OCR process...");

        let input = &ctx.inputs[0];
        let scratch = ctx
            .store
            .scratch_dir(&ctx.job_id)
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        let pages = self.prepare_pages(ctx, input, &scratch, CONTEXT).await?;
        let total = pages.len();

        ctx.progress.update("Performing OCR...", 40);
        let base = ctx.base_name();
        let tag = OperationKind::Ocr.tag();
        let (recognized, label) = match output_format {
            OcrOutputFormat::Txt | OcrOutputFormat::Docx => {
                let mut text = String::new();
                for (i, page) in pages.iter().enumerate() {
                    ctx.progress.update(
                        format!("Processing image {} of {}...", i + 1, total),
                        (40 + ((i + 1) * 45) / total) as u8,
                    );
                    let out_base = scratch.join(format!("ocr_text_{}", i + 1));
                    self.tesseract()
                        .arg_path(page)
                        .arg_path(&out_base)
                        .arg("-l")
                        .arg(language)
                        .run()
                        .await
                        .map_err(|e| wrap(CONTEXT, e))?;
                    let chunk = tokio::fs::read_to_string(out_base.with_extension("txt"))
                        .await
                        .map_err(|e| wrap(CONTEXT, e))?;
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str(chunk.trim_end());
                }
                if text.trim().is_empty() {
                    return Err(HandlerError::new(
                        "No text could be extracted from the file.",
                    ));
                }

                ctx.progress.update("Creating output files...", 90);
                match output_format {
                    OcrOutputFormat::Txt => {
                        let slot = ctx.store.allocate_output(&ctx.job_id, &base, tag, "txt");
                        let artifact = ctx
                            .store
                            .write_output(slot, Bytes::from(text))
                            .await
                            .map_err(|e| wrap(CONTEXT, e))?;
                        (artifact, "Text File (.txt)")
                    }
                    _ => {
                        let text_path = scratch.join("ocr_combined.txt");
                        tokio::fs::write(&text_path, &text)
                            .await
                            .map_err(|e| wrap(CONTEXT, e))?;
                        let produced =
                            text_to_docx(&self.tools, &scratch, &text_path, CONTEXT).await?;
                        let slot = ctx.store.allocate_output(&ctx.job_id, &base, tag, "docx");
                        (
                            adopt_file(&ctx.store, &produced, slot).await?,
                            "Word Document (.docx)",
                        )
                    }
                }
            }
            OcrOutputFormat::Pdf => {
                let mut parts = Vec::with_capacity(total);
                for (i, page) in pages.iter().enumerate() {
                    ctx.progress.update(
                        format!("Processing image {} of {}...", i + 1, total),
                        (40 + ((i + 1) * 45) / total) as u8,
                    );
                    let out_base = scratch.join(format!("ocr_out_{}", i + 1));
                    self.tesseract()
                        .arg_path(page)
                        .arg_path(&out_base)
                        .arg("-l")
                        .arg(language)
                        .arg("pdf")
                        .run()
                        .await
                        .map_err(|e| wrap(CONTEXT, e))?;
                    parts.push(out_base.with_extension("pdf"));
                }

                ctx.progress.update("Creating output files...", 90);
                let slot = ctx.store.allocate_output(&ctx.job_id, &base, tag, "pdf");
                let artifact = if let [only] = parts.as_slice() {
                    adopt_file(&ctx.store, only, slot).await?
                } else {
                    let mut cmd = ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
                        .arg("--empty")
                        .arg("--pages");
                    for part in &parts {
                        cmd = cmd.arg_path(part);
                    }
                    cmd.arg("--")
                        .arg_path(slot.path())
                        .run()
                        .await
                        .map_err(|e| wrap(CONTEXT, e))?;
                    ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?
                };
                (artifact, "Searchable PDF")
            }
        };

        Ok(HandlerOutcome {
            message: "OCR completed successfully!".to_string(),
            downloads: vec![recognized.to_descriptor(label)],
            log_entry: format!(
                "Recognized {} pages of {} (language: {})",
                total, input.name, language
            ),
        })
    }
}

/// Convert a plain-text file to docx through LibreOffice, returning the
/// produced path.
async fn text_to_docx(
    tools: &ToolsConfig,
    scratch: &std::path::Path,
    text_path: &std::path::Path,
    context: &str,
) -> Result<PathBuf, HandlerError> {
    ToolCommand::new(&tools.soffice, tools.timeout_secs)
        .arg("--headless")
        .arg("--convert-to")
        .arg("docx")
        .arg("--outdir")
        .arg_path(scratch)
        .arg_path(text_path)
        .run()
        .await
        .map_err(|e| wrap(context, e))?;

    let stem = text_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let produced = scratch.join(format!("{stem}.docx"));
    if produced.is_file() {
        Ok(produced)
    } else {
        Err(HandlerError::new(format!(
            "{context}: the conversion produced no output"
        )))
    }
}

/// Tesseract language specs are codes joined by `+`, like `eng` or
/// `eng+deu`.
fn is_valid_language(language: &str) -> bool {
    !language.is_empty()
        && language.split('+').all(|code| {
            !code.is_empty()
                && code
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
}
