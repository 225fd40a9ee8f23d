pub mod adapters;
pub mod api;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod services;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use error::{GorillionaireError, Result};
pub use jobs::{Job, JobScheduler};
pub use supervisor::{Supervisor, SupervisorEvent};
