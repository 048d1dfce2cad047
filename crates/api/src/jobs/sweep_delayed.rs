//! Periodic delayed auto-approval sweep.
//!
//! Every read already sweeps before answering; this job only makes delayed
//! approvals (and the roster publication that follows gate approvals)
//! happen on time when nobody is reading.

use std::sync::Arc;
use tracing::info;

use super::scheduler::{Job, JobFrequency};
use domain::services::WorkflowEngine;

pub struct SweepDelayedApprovalsJob {
    engine: Arc<WorkflowEngine>,
    interval_secs: u64,
}

impl SweepDelayedApprovalsJob {
    pub fn new(engine: Arc<WorkflowEngine>, interval_secs: u64) -> Self {
        Self {
            engine,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for SweepDelayedApprovalsJob {
    fn name(&self) -> &'static str {
        "sweep_delayed_approvals"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .engine
            .sweep_delayed_approvals()
            .await
            .map_err(|e| e.to_string())?;

        if !report.transitioned.is_empty() {
            info!(
                approved = report.transitioned.len(),
                gate = report.gate_transitioned,
                sync_failed = report.sync.is_failure(),
                "Scheduled sweep applied delayed approvals"
            );
        }
        Ok(())
    }
}
