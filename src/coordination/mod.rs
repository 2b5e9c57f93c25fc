//! Coordination between the control loop and its background tasks

pub mod shutdown;

pub use shutdown::{GracefulShutdown, ShutdownSignal};
