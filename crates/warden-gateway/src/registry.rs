use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use warden_core::{ActionKind, CapabilityHandler, WardenError};

/// Maps action kinds to their capability handlers.
///
/// Populated during startup; `register` for an already-mapped kind is a
/// programmer error surfaced immediately, not a silent overwrite at
/// dispatch time. The fallback lane holds the no-cost downgrade handler
/// the gateway tries when the budget rejects a charge.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<ActionKind, Arc<dyn CapabilityHandler>>,
    fallbacks: HashMap<ActionKind, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: ActionKind,
        handler: Arc<dyn CapabilityHandler>,
    ) -> warden_core::Result<()> {
        if self.handlers.contains_key(&kind) {
            return Err(WardenError::DuplicateCapability(kind));
        }
        debug!(kind = %kind, handler = handler.name(), "registered capability");
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Install the zero-cost fallback for a kind (e.g. a local model
    /// behind the paid one).
    pub fn register_fallback(
        &mut self,
        kind: ActionKind,
        handler: Arc<dyn CapabilityHandler>,
    ) -> warden_core::Result<()> {
        if self.fallbacks.contains_key(&kind) {
            return Err(WardenError::DuplicateCapability(kind));
        }
        debug!(kind = %kind, handler = handler.name(), "registered fallback capability");
        self.fallbacks.insert(kind, handler);
        Ok(())
    }

    pub fn resolve(&self, kind: ActionKind) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn fallback(&self, kind: ActionKind) -> Option<Arc<dyn CapabilityHandler>> {
        self.fallbacks.get(&kind).cloned()
    }

    /// Kinds with a registered primary handler.
    pub fn kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
