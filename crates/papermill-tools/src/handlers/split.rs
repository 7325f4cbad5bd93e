//! PDF split.

use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::options::{OddEven, SplitMethod};
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};
use papermill_store::BatchDir;

use crate::command::ToolCommand;

use super::{parse_range_groups, wrap};

const CONTEXT: &str = "Error splitting PDF";

/// Splits a PDF into per-page files, page-range parts, or odd/even halves,
/// then bundles everything into a zip.
pub struct SplitHandler {
    tools: Arc<ToolsConfig>,
}

impl SplitHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }

    fn qpdf(&self) -> ToolCommand {
        ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
    }

    /// One output document per page selector group.
    async fn split_groups(
        &self,
        ctx: &HandlerContext,
        batch: &BatchDir,
        groups: &[String],
    ) -> Result<(), HandlerError> {
        let total = groups.len();
        for (i, group) in groups.iter().enumerate() {
            ctx.progress.update(
                format!("Extracting part {} of {}...", i + 1, total),
                (20 + ((i + 1) * 70) / total) as u8,
            );
            self.qpdf()
                .arg("--empty")
                .arg("--pages")
                .arg_path(&ctx.inputs[0].path)
                .arg(group)
                .arg("--")
                .arg_path(batch.path().join(format!("part-{}.pdf", i + 1)))
                .run()
                .await
                .map_err(|e| wrap(CONTEXT, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl OperationHandler for SplitHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Split
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        let OperationOptions::Split {
            split_method,
            page_range,
            odd_even,
        } = &ctx.options
        else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF split process...");

        let base = ctx.base_name();
        let input = &ctx.inputs[0];
        let batch = ctx
            .store
            .create_batch(&ctx.job_id, &base, OperationKind::Split.tag())
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        ctx.progress.update("Splitting PDF...", 20);

        match split_method {
            SplitMethod::All => {
                self.qpdf()
                    .arg("--split-pages=1")
                    .arg_path(&input.path)
                    .arg_path(batch.path().join("part-%d.pdf"))
                    .run()
                    .await
                    .map_err(|e| wrap(CONTEXT, e))?;
            }
            SplitMethod::Range => {
                let groups = parse_range_groups(page_range.as_deref().unwrap_or_default())?;
                self.split_groups(ctx, &batch, &groups).await?;
            }
            SplitMethod::OddEven => {
                let selectors: &[&str] = match odd_even {
                    OddEven::Odd => &["1-z:odd"],
                    OddEven::Even => &["1-z:even"],
                    OddEven::All => &["1-z:odd", "1-z:even"],
                };
                let groups: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
                self.split_groups(ctx, &batch, &groups).await?;
            }
        }

        let pages = ctx
            .store
            .adopt_batch(&batch, &base, "pdf")
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        if pages.is_empty() {
            return Err(HandlerError::new(format!(
                "{CONTEXT}: no pages were produced"
            )));
        }

        ctx.progress.update("Creating ZIP file...", 95);
        let bundle = ctx
            .store
            .bundle(&ctx.job_id, &base, OperationKind::Split.tag(), &pages)
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        let mut downloads = vec![bundle.to_descriptor("All Pages (ZIP)")];
        downloads.extend(pages.iter().map(|page| page.to_descriptor(page.name.clone())));

        Ok(HandlerOutcome {
            message: format!("PDF split successfully into {} files!", pages.len()),
            downloads,
            log_entry: format!("Split {} into {} files", input.name, pages.len()),
        })
    }
}
