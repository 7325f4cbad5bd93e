//! PDF merge.

use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};
use papermill_store::Artifact;
use papermill_store::artifact::format_file_size;

use crate::command::ToolCommand;

use super::wrap;

const CONTEXT: &str = "Error merging PDFs";

/// Concatenates the uploaded PDFs, honoring an explicit page order, via
/// qpdf's page assembly.
pub struct MergeHandler {
    tools: Arc<ToolsConfig>,
}

impl MergeHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for MergeHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Merge
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        let OperationOptions::Merge { order } = &ctx.options else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF merge process...");

        // Order was validated as a permutation of the inputs at submission.
        let inputs: Vec<&Artifact> = match order {
            Some(order) => order.iter().map(|&i| &ctx.inputs[i]).collect(),
            None => ctx.inputs.iter().collect(),
        };
        let total = inputs.len();

        let mut cmd = ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
            .arg("--empty")
            .arg("--pages");
        for (i, input) in inputs.iter().enumerate() {
            ctx.progress.update_with_log(
                format!("Adding file {} of {}...", i + 1, total),
                (((i + 1) * 90) / total) as u8,
                format!(
                    "Adding {} ({})",
                    input.name,
                    format_file_size(input.size_bytes)
                ),
            );
            cmd = cmd.arg_path(&input.path);
        }

        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::Merge.tag(),
            "pdf",
        );
        ctx.progress.update("Writing merged PDF...", 95);
        cmd.arg("--")
            .arg_path(slot.path())
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;
        let merged = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        Ok(HandlerOutcome {
            message: "PDFs merged successfully!".to_string(),
            downloads: vec![merged.to_descriptor("Merged PDF")],
            log_entry: format!(
                "Merged {} files into {} ({})",
                total,
                merged.name,
                format_file_size(merged.size_bytes)
            ),
        })
    }
}
