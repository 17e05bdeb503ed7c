//! Shared plumbing for platform services: error taxonomy, base configuration,
//! and logging initialization.

pub mod config;
pub mod error;
pub mod observability;
