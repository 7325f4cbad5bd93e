//! Password protection and removal.

use std::sync::Arc;

use async_trait::async_trait;

use papermill_core::config::tools::ToolsConfig;
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, OperationHandler, OperationKind,
    OperationOptions,
};

use crate::command::{ToolCommand, ToolError};

use super::wrap;

/// Encrypts a PDF with AES-256 and the requested permission restrictions
/// via qpdf.
pub struct ProtectHandler {
    tools: Arc<ToolsConfig>,
}

impl ProtectHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for ProtectHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Protect
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error protecting PDF";
        let OperationOptions::Protect {
            password,
            allow_print,
            allow_copy,
            allow_modify,
        } = &ctx.options
        else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF protection process...");

        let input = &ctx.inputs[0];
        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::Protect.tag(),
            "pdf",
        );

        ctx.progress.update("Applying encryption...", 40);
        let mut cmd = ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
            .arg("--encrypt")
            .arg(password)
            .arg(password)
            .arg("256");
        if !allow_print {
            cmd = cmd.arg("--print=none");
        }
        if !allow_copy {
            cmd = cmd.arg("--extract=n");
        }
        if !allow_modify {
            cmd = cmd.arg("--modify=none");
        }
        cmd.arg("--")
            .arg_path(&input.path)
            .arg_path(slot.path())
            .run()
            .await
            .map_err(|e| wrap(CONTEXT, e))?;

        ctx.progress.update("Writing protected PDF...", 90);
        let protected = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        let restricted: Vec<&str> = [
            (!allow_print).then_some("print"),
            (!allow_copy).then_some("copy"),
            (!allow_modify).then_some("modify"),
        ]
        .into_iter()
        .flatten()
        .collect();
        let log_entry = if restricted.is_empty() {
            format!("Encrypted {} with no permission restrictions", input.name)
        } else {
            format!("Encrypted {}, restricted: {}", input.name, restricted.join(", "))
        };

        Ok(HandlerOutcome {
            message: "PDF protected successfully!".to_string(),
            downloads: vec![protected.to_descriptor("Protected PDF")],
            log_entry,
        })
    }
}

/// Removes password protection from a PDF via qpdf, surfacing a wrong
/// password as a readable failure.
pub struct UnlockHandler {
    tools: Arc<ToolsConfig>,
}

impl UnlockHandler {
    pub fn new(tools: Arc<ToolsConfig>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OperationHandler for UnlockHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::Unlock
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        const CONTEXT: &str = "Error unlocking PDF";
        let OperationOptions::Unlock { password } = &ctx.options else {
            return Err(HandlerError::new(format!("{CONTEXT}: options missing")));
        };
        ctx.progress.log("Starting PDF unlock process...");

        let input = &ctx.inputs[0];
        ctx.progress.update("Checking password...", 30);
        // Exit code 2 means "not encrypted"; the decrypt below still
        // produces a clean copy in that case.
        let encrypted = ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
            .arg("--is-encrypted")
            .arg_path(&input.path)
            .run()
            .await;
        match encrypted {
            Ok(_) => {}
            Err(ToolError::Failed { code: 2, .. }) => {
                ctx.progress.warn("The PDF is not password-protected.");
            }
            Err(e) => return Err(wrap(CONTEXT, e)),
        }

        ctx.progress.update("Removing password protection...", 60);
        let slot = ctx.store.allocate_output(
            &ctx.job_id,
            &ctx.base_name(),
            OperationKind::Unlock.tag(),
            "pdf",
        );
        let result = ToolCommand::new(&self.tools.qpdf, self.tools.timeout_secs)
            .arg(format!("--password={password}"))
            .arg("--decrypt")
            .arg_path(&input.path)
            .arg_path(slot.path())
            .run()
            .await;
        if let Err(e) = result {
            if let ToolError::Failed { ref stderr, .. } = e {
                if stderr.to_lowercase().contains("invalid password") {
                    return Err(HandlerError::with_source("Incorrect password.", e));
                }
            }
            return Err(wrap(CONTEXT, e));
        }

        ctx.progress.update("Writing unlocked PDF...", 90);
        let unlocked = ctx.store.seal(slot).await.map_err(|e| wrap(CONTEXT, e))?;

        Ok(HandlerOutcome {
            message: "PDF unlocked successfully!".to_string(),
            downloads: vec![unlocked.to_descriptor("Unlocked PDF")],
            log_entry: format!("Removed password protection from {}", input.name),
        })
    }
}
