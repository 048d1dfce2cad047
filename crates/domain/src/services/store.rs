//! Storage and clock seams used by the workflow engine.
//!
//! The persistence crate implements these traits over PostgreSQL;
//! `MemoryStore` (feature `test-util`) implements them in memory.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{
    ApprovalStamp, GateRosterEntry, GradeCount, NewPermitRequest, PermitRequest,
    PermitRequestWithStudent, RequestFilter, RequestStatus, RequestType, StatusTransition,
    Student, TypeStatusCount,
};

/// Storage failures, classified so callers can react to each kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A live request already exists for this (student, type) pair.
    #[error("duplicate request for student and type")]
    Duplicate,

    /// A referenced row does not exist (typically the student).
    #[error("referenced row does not exist")]
    ForeignKey,

    /// Connection-level failure that may succeed on retry.
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("storage failure: {0}")]
    Database(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Permit request persistence.
#[async_trait::async_trait]
pub trait PermitRequestStore: Send + Sync {
    /// Inserts a request. When `new.approval` carries a number allocation
    /// the number is drawn in the same transaction. Fails with
    /// [`StoreError::Duplicate`] when the (student, type) pair is taken.
    async fn insert(&self, new: &NewPermitRequest) -> Result<PermitRequest, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<PermitRequest>, StoreError>;

    /// Requests joined with student data, newest first.
    async fn list(&self, filter: &RequestFilter)
        -> Result<Vec<PermitRequestWithStudent>, StoreError>;

    /// Ids of pending requests of `request_type` submitted at or before
    /// `cutoff`, oldest first.
    async fn find_due_pending(
        &self,
        request_type: RequestType,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError>;

    /// Applies an approval stamp if the current status is one of `from`.
    /// Assigns a number from the stamp's allocation only if the request has
    /// none yet and clears any rejection reason. Returns `None` when the
    /// row is missing or in another state.
    async fn apply_approval(
        &self,
        id: i64,
        from: &[RequestStatus],
        stamp: &ApprovalStamp,
    ) -> Result<Option<StatusTransition>, StoreError>;

    /// Rejects the request if the current status is one of `from`, clearing
    /// approval time and approver. The approval number is kept.
    async fn apply_rejection(
        &self,
        id: i64,
        from: &[RequestStatus],
        reason: &str,
    ) -> Result<Option<StatusTransition>, StoreError>;

    /// Deletes the request only if it belongs to `student_id` and its
    /// status is one of `from`, in a single conditional statement.
    async fn delete_owned(
        &self,
        id: i64,
        student_id: &str,
        from: &[RequestStatus],
    ) -> Result<Option<PermitRequest>, StoreError>;

    async fn count_by_type_and_status(&self) -> Result<Vec<TypeStatusCount>, StoreError>;

    async fn count_by_grade(&self) -> Result<Vec<GradeCount>, StoreError>;

    /// Approved and auto-approved gate requests ordered by grade, class, name.
    async fn gate_roster(&self) -> Result<Vec<GateRosterEntry>, StoreError>;
}

/// Key/value settings persistence.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_all(&self) -> Result<HashMap<String, String>, StoreError>;

    /// Writes all pairs in one transaction.
    async fn save(&self, entries: &[(String, String)]) -> Result<(), StoreError>;
}

/// Rows removed by a student deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedRows {
    pub students: usize,
    pub requests: usize,
    /// Removed requests that were approved or auto-approved gate permits.
    pub approved_gate: usize,
}

/// Student roster persistence.
#[async_trait::async_trait]
pub trait StudentStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Student>, StoreError>;

    /// Every student ordered by grade, class and name.
    async fn list_all(&self) -> Result<Vec<Student>, StoreError>;

    /// Inserts or updates every student, returning how many were written.
    async fn upsert_many(&self, students: &[Student]) -> Result<usize, StoreError>;

    /// Deletes one student and their requests in one transaction.
    /// `students` is zero when the id is unknown.
    async fn remove(&self, id: &str) -> Result<RemovedRows, StoreError>;

    /// Deletes every request and every student in one transaction.
    async fn remove_all(&self) -> Result<RemovedRows, StoreError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|e| *e.into_inner())
    }
}
