//! Distributed Lock Implementation
//!
//! This module provides:
//! - Distributed lock data model with fence tokens and leases
//! - Lock acquire/release API with bounded waiting
//! - Scoped lock handles released on every exit path

mod guard;
mod model;
mod service;

pub use guard::{LockFence, LockGuard};
pub use model::*;
pub use service::*;
