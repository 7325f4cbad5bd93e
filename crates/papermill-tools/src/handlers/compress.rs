//! PDF compression.

use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::options::CompressionLevel;
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};
use papermill_store::artifact::format_file_size;

use crate::command::ToolCommand;

use super::wrap;

const CONTEXT: &str = "Error compressing PDF";

/// Ghostscript pdfwrite preset for each compression level. Higher
/// compression means more aggressive image downsampling.
fn preset(level: CompressionLevel) -> &'static str {
    match level {
        CompressionLevel::Low => "/printer",
        CompressionLevel::Medium => "/ebook",
        CompressionLevel::High => "/screen",
    }
}

/// Rewrites a PDF through Ghostscript's pdfwrite device at the requested
/// quality preset.
pub struct CompressHandler {
    tools: Arc<ToolsConfig>,
}

impl CompressHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for CompressHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Compress
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        let OperationOptions::Compress { compression_level } = &ctx.options else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF compression process...");

        let input = &ctx.inputs[0];
        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::Compress.tag(),
            "pdf",
        );

        ctx.progress.update("Reading PDF...", 20);
        ctx.progress.update("Compressing PDF...", 40);
        ToolCommand::new(&self.tools.ghostscript, self.tools.timeout_secs)
            .arg("-sDEVICE=pdfwrite")
            .arg("-dCompatibilityLevel=1.4")
            .arg(format!("-dPDFSETTINGS={}", preset(*compression_level)))
            .arg("-dNOPAUSE")
            .arg("-dQUIET")
            .arg("-dBATCH")
            .arg(format!("-sOutputFile={}", slot.path().display()))
            .arg_path(&input.path)
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        ctx.progress.update("Writing compressed PDF...", 90);
        let compressed = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        let reduction = (100i64
            - (compressed.size_bytes as i64 * 100) / input.size_bytes.max(1) as i64)
            .max(0);

        Ok(HandlerOutcome {
            message: "PDF compressed successfully!".to_string(),
            downloads: vec![compressed.to_descriptor("Compressed PDF")],
            log_entry: format!(
                "Original size: {}, compressed size: {} ({}% reduction)",
                format_file_size(input.size_bytes),
                format_file_size(compressed.size_bytes),
                reduction
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_tracks_level() {
        assert_eq!(preset(CompressionLevel::Low), "/printer");
        assert_eq!(preset(CompressionLevel::Medium), "/ebook");
        assert_eq!(preset(CompressionLevel::High), "/screen");
    }
}
