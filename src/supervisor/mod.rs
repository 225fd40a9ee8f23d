//! Supervision for long-running services
//!
//! The HTTP server runs under a [`Supervisor`] that restarts it with
//! exponential backoff and gives up after too many restarts in a window.

pub mod restart;

pub use restart::{backoff_delay, Supervisor, SupervisorEvent};
