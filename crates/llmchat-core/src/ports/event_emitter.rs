//! Event emitter trait for broadcasting core state changes.
//!
//! This module defines the abstraction for emitting application events.
//! Implementations handle transport details (channels, UI bindings, etc.).

use crate::events::AppEvent;

/// Trait for emitting application events.
///
/// Emitters must deliver events in the order `emit` is called.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and contexts that don't need events
/// - `EventBus` - Ordered fan-out to any number of subscribers
pub trait AppEventEmitter: Send + Sync {
    /// Emit an application event.
    ///
    /// This method must not block.
    fn emit(&self, event: AppEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn AppEventEmitter>;
}

/// A no-op event emitter for tests.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl AppEventEmitter for NoopEmitter {
    fn emit(&self, _event: AppEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}
