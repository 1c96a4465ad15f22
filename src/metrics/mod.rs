//! Metrics and observability infrastructure for floe.
//!
//! This module groups all observability-related components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

// Re-export commonly used items
pub use server::init;

/// Emit an internal event as a metric.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use floe::metrics::events::RowsWritten;
///
/// emit!(RowsWritten { count: 10 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
