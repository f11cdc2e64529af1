//! Core types and error definitions for the concord orchestration core.
//!
//! This crate provides the foundational types shared across all concord crates:
//! the error taxonomy, the chat message representation handed to language
//! models, and tracing setup.
//!
//! # Main types
//!
//! - [`ConcordError`] — Unified error enum for all concord subsystems.
//! - [`ConcordResult`] — Convenience alias for `Result<T, ConcordError>`.
//! - [`Role`] — Message role (system, user, assistant).
//! - [`ChatMessage`] — One entry of the ordered model history.
//! - [`init_tracing`] — Installs the global `tracing` subscriber.

/// Error taxonomy.
pub mod error;
/// Chat message types.
pub mod message;
/// Tracing subscriber setup.
pub mod telemetry;

pub use error::{ConcordError, ConcordResult};
pub use message::{ChatMessage, Role};
pub use telemetry::{init_tracing, LogFormat};
