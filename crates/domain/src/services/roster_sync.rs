//! Roster sync notifier contract.
//!
//! Whenever the set of approved gate permits changes, the workflow engine
//! asks the notifier to republish the whole gate roster. The engine never
//! looks at roster contents and never lets a notifier failure undo the
//! state change that triggered it.

#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use super::store::StoreError;

/// Roster publication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifierError {
    #[error("roster sync is not configured: {0}")]
    NotConfigured(String),

    #[error("could not read the gate roster: {0}")]
    Storage(#[from] StoreError),

    #[error("roster sync request failed: {0}")]
    Transport(String),

    #[error("unexpected roster sync response: {0}")]
    InvalidResponse(String),

    #[error("roster sync rejected: {0}")]
    Rejected(String),
}

/// Publishes the current gate roster to the external attendance sheet.
#[async_trait::async_trait]
pub trait RosterSyncNotifier: Send + Sync {
    /// Replaces the remote roster, returning the number of rows written.
    async fn publish_gate_roster(&self) -> Result<usize, NotifierError>;
}

/// What happened to the roster after a state change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncOutcome {
    /// The change did not affect the approved gate roster.
    #[default]
    NotRequired,
    Published(usize),
    Failed(String),
}

impl SyncOutcome {
    pub fn from_result(result: Result<usize, NotifierError>) -> Self {
        match result {
            Ok(rows) => SyncOutcome::Published(rows),
            Err(e) => SyncOutcome::Failed(e.to_string()),
        }
    }

    /// Advisory text appended to user-facing success messages.
    pub fn advisory(&self) -> Option<String> {
        match self {
            SyncOutcome::NotRequired => None,
            SyncOutcome::Published(rows) => Some(format!("Gate roster synced ({} rows)", rows)),
            SyncOutcome::Failed(reason) => Some(format!("Gate roster sync failed: {}", reason)),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }
}

/// Notifier used when roster sync is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRosterSync;

#[async_trait::async_trait]
impl RosterSyncNotifier for DisabledRosterSync {
    async fn publish_gate_roster(&self) -> Result<usize, NotifierError> {
        tracing::debug!("Roster sync disabled, skipping publication");
        Ok(0)
    }
}

/// Mock notifier for tests. Counts calls instead of publishing anything.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct MockRosterSyncNotifier {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    calls: AtomicUsize,
}

#[cfg(any(test, feature = "test-util"))]
impl MockRosterSyncNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock notifier that fails every call.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait::async_trait]
impl RosterSyncNotifier for MockRosterSyncNotifier {
    async fn publish_gate_roster(&self) -> Result<usize, NotifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.simulate_failure {
            tracing::warn!(call, "Mock roster notifier simulating failure");
            return Err(NotifierError::Transport("Simulated failure".to_string()));
        }
        tracing::info!(call, "Mock: Would publish gate roster");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let mock = MockRosterSyncNotifier::new();
        assert_eq!(mock.publish_gate_roster().await, Ok(0));
        assert_eq!(mock.publish_gate_roster().await, Ok(0));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockRosterSyncNotifier::failing();
        assert!(mock.publish_gate_roster().await.is_err());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_reports_zero_rows() {
        assert_eq!(DisabledRosterSync.publish_gate_roster().await, Ok(0));
    }

    #[test]
    fn test_advisory() {
        assert_eq!(SyncOutcome::NotRequired.advisory(), None);
        assert_eq!(
            SyncOutcome::Published(3).advisory().as_deref(),
            Some("Gate roster synced (3 rows)")
        );
        let failed = SyncOutcome::from_result(Err(NotifierError::Rejected("quota".to_string())));
        assert!(failed.is_failure());
        assert_eq!(
            failed.advisory().as_deref(),
            Some("Gate roster sync failed: roster sync rejected: quota")
        );
    }
}
