//! Page rotation and watermarking.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::options::{RotatePages, WatermarkKind};
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};

use crate::command::ToolCommand;

use super::{parse_range_groups, wrap};

/// Rotates all pages or a page range by a quarter-turn multiple via qpdf.
pub struct RotateHandler {
    tools: Arc<ToolsConfig>,
}

impl RotateHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for RotateHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Rotate
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error rotating PDF";
        let OperationOptions::Rotate {
            angle,
            pages,
            rotate_range,
        } = &ctx.options
        else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF rotation process...");

        let range_spec = match pages {
            RotatePages::All => "1-z".to_string(),
            RotatePages::Custom => {
                parse_range_groups(rotate_range.as_deref().unwrap_or_default())?.join(",")
            }
        };

        let input = &ctx.inputs[0];
        ctx.progress.update("Reading PDF...", 20);
        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::Rotate.tag(),
            "pdf",
        );

        ctx.progress.update("Rotating pages...", 50);
        ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
            .arg_path(&input.path)
            .arg_path(slot.path())
            .arg(format!("--rotate=+{angle}:{range_spec}"))
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        ctx.progress.update("Creating rotated PDF...", 90);
        let rotated = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        Ok(HandlerOutcome {
            message: "PDF rotated successfully!".to_string(),
            downloads: vec![rotated.to_descriptor("Rotated PDF")],
            log_entry: format!(
                "Rotated pages {} of {} by {} degrees",
                range_spec, input.name, angle
            ),
        })
    }
}

/// Fractional page coordinates for a watermark position token like
/// `top-left` or `middle-center`. Unknown tokens fall back to the center.
fn position_fractions(position: &str) -> (f64, f64) {
    let y = if position.starts_with("top") {
        0.8
    } else if position.starts_with("bottom") {
        0.2
    } else {
        0.5
    };
    let x = if position.ends_with("left") {
        0.2
    } else if position.ends_with("right") {
        0.8
    } else {
        0.5
    };
    (x, y)
}

/// Escape a string for inclusion in a PostScript literal.
fn ps_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Stamps a translucent text or image watermark over every page: the
/// overlay is rendered as a one-page PDF, then laid over the input with
/// qpdf.
pub struct WatermarkHandler {
    tools: Arc<ToolsConfig>,
}

impl WatermarkHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }

    /// Render a diagonal text watermark onto a US Letter overlay page with
    /// Ghostscript.
    async fn render_text_overlay(
        &self,
        overlay: &Path,
        text: &str,
        opacity: u8,
        position: &str,
        context: &str,
    ) -> Result<(), HandlerError> {
        const PAGE_WIDTH: f64 = 612.0;
        const PAGE_HEIGHT: f64 = 792.0;
        const FONT_SIZE: f64 = 61.0;

        let (fx, fy) = position_fractions(position);
        let alpha = f64::from(opacity) / 100.0;
        let program = format!(
            "{alpha:.2} .setfillconstantalpha \
             /Helvetica findfont {FONT_SIZE} scalefont setfont \
             0 0 0 setrgbcolor \
             {x:.1} {y:.1} translate 45 rotate \
             ({text}) dup stringwidth pop 2 div neg 0 moveto show",
            x = PAGE_WIDTH * fx,
            y = PAGE_HEIGHT * fy,
            text = ps_escape(text),
        );

        ToolCommand::new(&self.tools.ghostscript, self.tools.timeout_secs)
            .arg("-q")
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-dALLOWPSTRANSPARENCY")
            .arg("-sDEVICE=pdfwrite")
            .arg(format!("-dDEVICEWIDTHPOINTS={PAGE_WIDTH}"))
            .arg(format!("-dDEVICEHEIGHTPOINTS={PAGE_HEIGHT}"))
            .arg(format!("-sOutputFile={}", overlay.display()))
            .arg("-c")
            .arg(program)
            .run()
            .await
            .map_err(|e| wrap(context, e))?;
        Ok(())
    }
}

#[async_trait]
impl OperationHandler for WatermarkHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Watermark
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error adding watermark";
        let OperationOptions::Watermark {
            watermark_type,
            watermark_text,
            opacity,
            position,
        } = &ctx.options
        else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting watermark process...");

        let input = &ctx.inputs[0];
        let scratch = ctx
            .store
            .scratch_dir(&ctx.job_id)
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        let overlay = scratch.join("watermark.pdf");

        ctx.progress.update("Reading PDF...", 20);
        ctx.progress.update("Creating watermark...", 40);
        match watermark_type {
            WatermarkKind::Text => {
                // Presence of the text was validated at submission.
                let text = watermark_text.as_deref().unwrap_or_default();
                self.render_text_overlay(&overlay, text, *opacity, position, CONTEXT)
                    .await?;
            }
            WatermarkKind::Image => {
                let image = ctx
                    .inputs
                    .get(1)
                    .ok_or_else(|| HandlerError::new("No watermark image was uploaded."))?;
                ToolCommand::new(&self.tools.magick, self.tools.timeout_secs)
                    .arg_path(&image.path)
                    .arg("-alpha")
                    .arg("set")
                    .arg("-channel")
                    .arg("A")
                    .arg("-evaluate")
                    .arg("multiply")
                    .arg(format!("{:.2}", f64::from(*opacity) / 100.0))
                    .arg_path(&overlay)
                    .run()
                    .await
                    .map_err(|e| wrap(CONTEXT, e))?;
            }
        }

        ctx.progress.update("Adding watermark to pages...", 60);
        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::Watermark.tag(),
            "pdf",
        );
        ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
            .arg_path(&input.path)
            .arg("--overlay")
            .arg_path(&overlay)
            .arg("--repeat=1-z")
            .arg("--")
            .arg_path(slot.path())
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        ctx.progress.update("Writing watermarked PDF...", 90);
        let watermarked = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        Ok(HandlerOutcome {
            message: "Watermark added successfully!".to_string(),
            downloads: vec![watermarked.to_descriptor("Watermarked PDF")],
            log_entry: format!("Watermarked {} ({} watermark)", input.name, match watermark_type {
                WatermarkKind::Text => "text",
                WatermarkKind::Image => "image",
            }),
        })
    }
}
