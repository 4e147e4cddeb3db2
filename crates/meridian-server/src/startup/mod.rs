//! Application startup utilities module.

mod logging;
mod node;
mod shutdown;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use node::MeridianNode;
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
