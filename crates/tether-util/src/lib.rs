//! Shared utilities for tether
//!
//! This crate provides:
//! - Unique endpoint naming (process id + random salt)
//! - Default paths for the runtime directory

mod ids;
mod paths;

pub use ids::*;
pub use paths::*;
