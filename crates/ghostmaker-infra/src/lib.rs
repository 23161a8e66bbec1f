//! Ghostmaker Infrastructure Library
//!
//! Shared plumbing used by the ghostmaker binaries:
//! - Tracing subscriber initialisation
//! - Notification sinks (log, signed webhook, fan-out)

pub mod notify;
pub mod telemetry;

// Re-export commonly used types
pub use notify::{CompositeNotifier, LogNotifier};
#[cfg(feature = "webhook")]
pub use notify::{WebhookNotifier, WebhookNotifierConfig};
pub use telemetry::{init_telemetry, LogFormat};
