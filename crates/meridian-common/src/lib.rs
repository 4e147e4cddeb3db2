//! Meridian Common - Shared types, traits, and utilities
//!
//! This crate provides the foundational types used across all Meridian components:
//! - Registry error taxonomy
//! - Context traits for dependency injection
//! - Common constants

pub mod error;
pub mod traits;

// Re-exports for convenience
pub use error::{RegistryError, Result};
pub use traits::*;

/// Default name of the shared map backing the entry and node-index registry
pub const DEFAULT_REGISTRY_NAME: &str = "entityRegistry";

/// Separator between a namespace and a name in lock and map identifiers
pub const NAMESPACE_SEPARATOR: &str = "::";
