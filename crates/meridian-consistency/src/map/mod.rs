//! Shared Map Facade
//!
//! Named cluster-wide maps whose values are ordered, duplicate-free entry
//! collections.

mod model;
mod service;

pub use model::EntryList;
pub use service::*;
