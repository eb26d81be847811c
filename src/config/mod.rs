//! Configuration & shared types
//!
//! - [`types`]: crate error type and closed enums shared across modules
//! - [`settings`]: harness configuration loading and validation

pub mod settings;
pub mod types;
