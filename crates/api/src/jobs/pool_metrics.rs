//! Samples connection pool gauges.

use sqlx::PgPool;
use tracing::warn;

use super::scheduler::{Job, JobFrequency};

const SAMPLE_INTERVAL_SECS: u64 = 15;

/// Publishes the `database_connections_*` gauges and warns while every
/// connection in the pool is checked out.
pub struct PoolMetricsJob {
    pool: PgPool,
    max_connections: u32,
}

impl PoolMetricsJob {
    pub fn new(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }
}

fn is_saturated(size: u32, idle: usize, max_connections: u32) -> bool {
    max_connections > 0 && size >= max_connections && idle == 0
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(SAMPLE_INTERVAL_SECS)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);

        let size = self.pool.size();
        if is_saturated(size, self.pool.num_idle(), self.max_connections) {
            warn!(size, max = self.max_connections, "Connection pool saturated");
        }
        Ok(())
    }
}
