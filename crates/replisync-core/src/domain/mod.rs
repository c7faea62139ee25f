//! Domain entities and business logic
//!
//! This module contains the core domain types for Replisync:
//! - Newtypes for validated tree roots, relative paths and content hashes
//! - Pass-level types (comparison mode, pass report, scheduler state)
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod pass;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::*;
pub use pass::{CompareMode, PassPhase, PassReport, SchedulerState};
