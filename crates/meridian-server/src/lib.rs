//! Meridian Server - a cluster node hosting the write-safe registry

pub mod cli;
pub mod metrics;
pub mod startup;
