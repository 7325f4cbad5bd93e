//! PDF page rasterization and image-to-PDF assembly.

use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::options::ImageFormat;
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};
use papermill_store::Artifact;

use crate::command::ToolCommand;

use super::wrap;

/// Rasterizes every PDF page through pdftoppm and bundles the images.
pub struct PdfToImagesHandler {
    tools: Arc<ToolsConfig>,
}

impl PdfToImagesHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for PdfToImagesHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::PdfToImages
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error converting PDF to images";
        let OperationOptions::PdfToImages { format, dpi } = &ctx.options else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF to image conversion...");

        let base = ctx.base_name();
        let input = &ctx.inputs[0];
        let batch = ctx
            .store
            .create_batch(&ctx.job_id, &base, OperationKind::PdfToImages.tag())
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        ctx.progress.update("Converting PDF to images...", 30);
        let format_flag = match format {
            ImageFormat::Jpg => "-jpeg",
            ImageFormat::Png => "-png",
        };
        ToolCommand::new(&self.tools.pdftoppm, self.tools.timeout_secs)
            .arg(format_flag)
            .arg("-r")
            .arg(dpi.to_string())
            .arg_path(&input.path)
            .arg_path(batch.path().join("page"))
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        ctx.progress.update("Collecting images...", 80);
        let images = ctx
            .store
            .adopt_batch(&batch, &base, format.ext())
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        if images.is_empty() {
            return Err(HandlerError::new("Failed to convert PDF to images."));
        }

        ctx.progress.update("Creating ZIP file...", 95);
        let bundle = ctx
            .store
            .bundle(&ctx.job_id, &base, OperationKind::PdfToImages.tag(), &images)
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        let mut downloads = vec![bundle.to_descriptor("All Images (ZIP)")];
        downloads.extend(images.iter().map(|img| img.to_descriptor(img.name.clone())));

        Ok(HandlerOutcome {
            message: format!("PDF converted to {} images successfully!", images.len()),
            downloads,
            log_entry: format!(
                "Rasterized {} into {} images at {} dpi",
                input.name,
                images.len(),
                dpi
            ),
        })
    }
}

/// Assembles the uploaded images into a single PDF, honoring an explicit
/// page order, via ImageMagick.
pub struct ImagesToPdfHandler {
    tools: Arc<ToolsConfig>,
}

impl ImagesToPdfHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for ImagesToPdfHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::ImagesToPdf
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error converting images to PDF";
        let OperationOptions::ImagesToPdf { order } = &ctx.options else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting image to PDF conversion...");

        let inputs: Vec<&Artifact> = match order {
            Some(order) => order.iter().map(|&i| &ctx.inputs[i]).collect(),
            None => ctx.inputs.iter().collect(),
        };
        let total = inputs.len();

        let mut cmd = ToolCommand::new(&self.tools.magick, self.tools.timeout_secs);
        for (i, input) in inputs.iter().enumerate() {
            ctx.progress.update(
                format!("Adding image {} of {}...", i + 1, total),
                (10 + ((i + 1) * 70) / total) as u8,
            );
            cmd = cmd.arg_path(&input.path);
        }

        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::ImagesToPdf.tag(),
            "pdf",
        );
        ctx.progress.update("Writing PDF...", 90);
        cmd.arg_path(slot.path())
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        let combined = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        Ok(HandlerOutcome {
            message: format!("{total} images converted to PDF successfully!"),
            downloads: vec![combined.to_descriptor("PDF from Images")],
            log_entry: format!("Combined {} images into {}", total, combined.name),
        })
    }
}
