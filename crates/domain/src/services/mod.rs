//! Domain services for the permit desk.
//!
//! Services contain business logic that operates on domain models.

pub mod approval_number;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod roster_import;
pub mod roster_sync;
pub mod store;
pub mod workflow;

pub use approval_number::{ApprovalNumberIssuer, NumberAllocation};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use roster_import::{parse_roster, ImportRowError, ImportStudentsRequest, ImportStudentsResponse};
pub use roster_sync::{DisabledRosterSync, NotifierError, RosterSyncNotifier, SyncOutcome};
#[cfg(any(test, feature = "test-util"))]
pub use roster_sync::MockRosterSyncNotifier;
pub use store::{
    Clock, ManualClock, PermitRequestStore, RemovedRows, SettingsStore, StoreError, StudentStore,
    SystemClock,
};
pub use workflow::{
    ApprovalError, CancellationError, CancellationOutcome, QueryError, RejectionError,
    RemovalOutcome, SettingsError, StudentError, SubmissionError, SubmissionOutcome, SweepReport,
    TransitionOutcome, WorkflowConfig, WorkflowEngine, SYSTEM_AUTO_APPROVER,
    SYSTEM_DELAY_APPROVER,
};
