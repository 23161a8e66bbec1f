//! Ghostmaker API Library
//!
//! HTTP handlers, application state and setup for the ghostmaker service.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
