//! Office document conversions through LibreOffice.
//!
//! Six operation kinds share one handler: each is a single headless
//! `--convert-to` invocation differing only in target format and labels.

use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};
use papermill_store::artifact::format_file_size;

use crate::command::ToolCommand;

use super::{adopt_file, wrap};

/// Static conversion profile for one office kind.
struct Profile {
    /// LibreOffice `--convert-to` target, also the output extension.
    target: &'static str,
    /// Download descriptor type label.
    label: &'static str,
    /// Terminal success message.
    message: &'static str,
    /// User-facing failure context.
    context: &'static str,
}

fn profile(kind: OperationKind) -> Option<Profile> {
    let profile = match kind {
        OperationKind::PdfToWord => Profile {
            target: "docx",
            label: "Word Document",
            message: "PDF converted to Word successfully!",
            context: "Error converting PDF to Word",
        },
        OperationKind::PdfToExcel => Profile {
            target: "xlsx",
            label: "Excel Spreadsheet",
            message: "PDF converted to Excel successfully!",
            context: "Error converting PDF to Excel",
        },
        OperationKind::PdfToPpt => Profile {
            target: "pptx",
            label: "PowerPoint Presentation",
            message: "PDF converted to PowerPoint successfully!",
            context: "Error converting PDF to PowerPoint",
        },
        OperationKind::WordToPdf => Profile {
            target: "pdf",
            label: "PDF Document",
            message: "Word document converted to PDF successfully!",
            context: "Error converting Word to PDF",
        },
        OperationKind::ExcelToPdf => Profile {
            target: "pdf",
            label: "PDF Document",
            message: "Excel spreadsheet converted to PDF successfully!",
            context: "Error converting Excel to PDF",
        },
        OperationKind::PptToPdf => Profile {
            target: "pdf",
            label: "PDF Document",
            message: "PowerPoint presentation converted to PDF successfully!",
            context: "Error converting PowerPoint to PDF",
        },
        _ => return None,
    };
    Some(profile)
}

/// Converts between PDF and office formats via a headless LibreOffice run.
pub struct OfficeConvertHandler {
    kind: OperationKind,
    tools: Arc<ToolsConfig>,
}

impl OfficeConvertHandler {
    /// The six kinds this handler family covers.
    pub const KINDS: [OperationKind; 6] = [
        OperationKind::PdfToWord,
        OperationKind::PdfToExcel,
        OperationKind::PdfToPpt,
        OperationKind::WordToPdf,
        OperationKind::ExcelToPdf,
        OperationKind::PptToPdf,
    ];

    pub fn new(kind: OperationKind, tools: Arc<ToolsConfig>) -> Self {
        Self { kind, tools }
    }
}

#[async_trait]
impl OperationHandler for OfficeConvertHandler {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        let profile = profile(self.kind)
            .ok_or_else(|| HandlerError::new(format!("Unsupported conversion: {}", self.kind)))?;
        // These kinds carry no options; reject a mismatched bag anyway.
        match &ctx.options {
            OperationOptions::PdfToWord
            | OperationOptions::PdfToExcel
            | OperationOptions::PdfToPpt
            | OperationOptions::WordToPdf
            | OperationOptions::ExcelToPdf
            | OperationOptions::PptToPdf => {}
            _ => {
                return Err(HandlerError::new(format!(
                    "{}: options missing",
                    profile.context
                )));
            }
        }
        ctx.progress.log("Starting conversion process...");

        let input = &ctx.inputs[0];
        let scratch = ctx
            .store
            .scratch_dir(&ctx.job_id)
            .await
            .map_err(|e| wrap(profile.context, e))?;

        ctx.progress.update("Converting document...", 30);
        ToolCommand::new(&self.tools.soffice, self.tools.timeout_secs)
            .arg("--headless")
            .arg("--convert-to")
            .arg(profile.target)
            .arg("--outdir")
            .arg_path(&scratch)
            .arg_path(&input.path)
            .run()
            .await
            .map_err(|e| wrap(profile.context, e))?;

        // LibreOffice writes {input stem}.{target} into the out directory.
        let stem = input
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let produced = scratch.join(format!("{stem}.{}", profile.target));
        if !produced.is_file() {
            return Err(HandlerError::new(format!(
                "{}: the conversion produced no output",
                profile.context
            )));
        }

        ctx.progress.update("Finalizing document...", 90);
        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            self.kind.tag(),
            profile.target,
        );
        let converted = adopt_file(&ctx.store, &produced, slot).await?;

        Ok(HandlerOutcome {
            message: profile.message.to_string(),
            downloads: vec![converted.to_descriptor(profile.label)],
            log_entry: format!(
                "Converted {} to {} ({})",
                input.name,
                converted.name,
                format_file_size(converted.size_bytes)
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_office_kind_has_a_profile() {
        for kind in OfficeConvertHandler::KINDS {
            assert!(profile(kind).is_some(), "{kind}");
        }
        assert!(profile(OperationKind::Merge).is_none());
    }

    #[test]
    fn test_pdf_targets_for_office_inputs() {
        for kind in [
            OperationKind::WordToPdf,
            OperationKind::ExcelToPdf,
            OperationKind::PptToPdf,
        ] {
            let profile = profile(kind).unwrap();
            assert_eq!(profile.target, "pdf");
            assert_eq!(profile.label, "PDF Document");
        }
    }
}
