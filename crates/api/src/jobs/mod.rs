//! Background job scheduler and job implementations.

mod pool_metrics;
mod scheduler;
mod sweep_delayed;

pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use sweep_delayed::SweepDelayedApprovalsJob;
