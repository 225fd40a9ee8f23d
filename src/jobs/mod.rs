//! Scheduled background jobs
//!
//! Every job runs on its own fixed interval under the [`JobScheduler`], which
//! guarantees a job never overlaps with itself.

pub mod holders;
pub mod prices;
pub mod scheduler;
pub mod signals;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use holders::HolderSnapshotJob;
pub use prices::PriceUpdateJob;
pub use scheduler::{JobScheduler, JobStats, SchedulerStats};
pub use signals::SignalGenerationJob;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<()>;
}
