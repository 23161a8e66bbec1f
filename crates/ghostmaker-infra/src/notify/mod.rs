//! Notification sinks
//!
//! Every sink implements `ghostmaker_core::NotificationSink`. The orchestrator spawns
//! deliveries and only logs their errors.

mod composite;
mod log;
#[cfg(feature = "webhook")]
mod webhook;

pub use composite::CompositeNotifier;
pub use log::LogNotifier;
#[cfg(feature = "webhook")]
pub use webhook::{sign_payload, WebhookNotifier, WebhookNotifierConfig, SIGNATURE_HEADER};
