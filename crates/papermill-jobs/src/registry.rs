//! The operation registry.
//!
//! Maps each [`OperationKind`] to its handler. Built once at startup and
//! frozen behind shared references; performs validation only, never any
//! transformation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use papermill_core::error::AppError;
use papermill_core::result::AppResult;

use crate::handler::OperationHandler;
use crate::kind::OperationKind;
use crate::options::OperationOptions;

/// Read-only mapping from operation kind to handler.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: HashMap<OperationKind, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            registry: Self::default(),
        }
    }

    /// Look up the handler for a kind.
    pub fn handler(&self, kind: OperationKind) -> AppResult<Arc<dyn OperationHandler>> {
        self.handlers.get(&kind).cloned().ok_or_else(|| {
            AppError::unknown_operation(format!("No handler registered for operation: {kind}"))
        })
    }

    /// Whether a handler is registered for a kind.
    pub fn has_handler(&self, kind: OperationKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Validate a submission's shape: known kind, enough inputs, and a
    /// well-formed option bag. Returns the parsed options on success.
    /// Fast and synchronous; runs before any acknowledgment.
    pub fn validate(
        &self,
        kind: OperationKind,
        input_count: usize,
        fields: &HashMap<String, String>,
    ) -> AppResult<OperationOptions> {
        if !self.has_handler(kind) {
            return Err(AppError::unknown_operation(format!(
                "No handler registered for operation: {kind}"
            )));
        }
        if input_count < kind.min_inputs() {
            return Err(AppError::validation(kind.missing_input_message()));
        }
        OperationOptions::parse(kind, fields, input_count)
    }

    /// Registered kinds, for startup logging.
    pub fn registered_kinds(&self) -> Vec<OperationKind> {
        let mut kinds: Vec<OperationKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.wire_name());
        kinds
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}

/// Builder collecting handlers before the registry is frozen.
pub struct RegistryBuilder {
    registry: OperationRegistry,
}

impl RegistryBuilder {
    /// Register a handler under the kind it declares. A later registration
    /// for the same kind replaces the earlier one.
    pub fn register(mut self, handler: Arc<dyn OperationHandler>) -> Self {
        let kind = handler.kind();
        info!(operation = %kind, "Registered operation handler");
        self.registry.handlers.insert(kind, handler);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> OperationRegistry {
        self.registry
    }
}
