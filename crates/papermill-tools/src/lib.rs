//! # papermill-tools
//!
//! Operation handlers that shell out to external command-line tools (qpdf,
//! Ghostscript, Poppler, LibreOffice, Tesseract, ImageMagick), plus the
//! process runner they share. [`build_registry`] wires every handler into
//! an [`OperationRegistry`] over one tools configuration.

pub mod command;
pub mod handlers;

use std::sync::Arc;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::OperationRegistry;

use handlers::compress::CompressHandler;
use handlers::extract::{ExtractTextHandler, OcrHandler};
use handlers::images::{ImagesToPdfHandler, PdfToImagesHandler};
use handlers::merge::MergeHandler;
use handlers::office::OfficeConvertHandler;
use handlers::organize::{RotateHandler, WatermarkHandler};
use handlers::protect::{ProtectHandler, UnlockHandler};
use handlers::split::SplitHandler;

/// Build the registry covering every supported operation.
pub fn build_registry(tools: &ToolsConfig) -> OperationRegistry {
    let tools = Arc::new(tools.clone());
    let mut builder = OperationRegistry::builder()
        .register(Arc::new(MergeHandler::new(Arc::clone(&tools))))
        .register(Arc::new(SplitHandler::new(Arc::clone(&tools))))
        .register(Arc::new(CompressHandler::new(Arc::clone(&tools))))
        .register(Arc::new(PdfToImagesHandler::new(Arc::clone(&tools))))
        .register(Arc::new(ImagesToPdfHandler::new(Arc::clone(&tools))))
        .register(Arc::new(ExtractTextHandler::new(Arc::clone(&tools))))
        .register(Arc::new(OcrHandler::new(Arc::clone(&tools))))
        .register(Arc::new(RotateHandler::new(Arc::clone(&tools))))
        .register(Arc::new(WatermarkHandler::new(Arc::clone(&tools))))
        .register(Arc::new(ProtectHandler::new(Arc::clone(&tools))))
        .register(Arc::new(UnlockHandler::new(Arc::clone(&tools))));
    for kind in OfficeConvertHandler::KINDS {
        builder = builder.register(Arc::new(OfficeConvertHandler::new(kind, Arc::clone(&tools))));
    }
    builder.build()
}
