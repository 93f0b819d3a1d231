//! # Preflight Common Library
//!
//! Shared code for the Preflight checklist crates including:
//! - Error types
//! - Event types (PreflightEvent enum) and the EventBus
//! - TOML configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PreflightEvent};
