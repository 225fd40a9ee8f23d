//! Coordination layer
//!
//! Shutdown signalling shared by the HTTP server, the job scheduler and the
//! restart supervisor.

pub mod shutdown;

pub use shutdown::{
    install_signal_handlers, GracefulShutdown, ShutdownConfig, ShutdownPhase, ShutdownSignal,
    ShutdownStep, ShutdownToken,
};
