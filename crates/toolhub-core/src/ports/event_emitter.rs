//! Event emitter trait for lifecycle notifications.
//!
//! Implementations handle transport details (channels, logs, SSE, etc.).

use crate::events::McpEvent;

/// Trait for emitting MCP lifecycle events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and CLI contexts that don't need events
/// - Adapter-specific implementations (channels, log sinks, etc.)
pub trait McpEventEmitter: Send + Sync {
    /// Emit an event. Must not block.
    fn emit(&self, event: McpEvent);
}

/// A no-op event emitter for tests and CLI contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl McpEventEmitter for NoopEmitter {
    fn emit(&self, _event: McpEvent) {
        // Intentionally do nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter() {
        let emitter = NoopEmitter::new();

        // Should not panic
        emitter.emit(McpEvent::server_stopped("fs"));
    }

    #[test]
    fn test_emitter_as_trait_object() {
        let emitter: Arc<dyn McpEventEmitter> = Arc::new(NoopEmitter::new());
        emitter.emit(McpEvent::server_removed("fs"));
    }
}
