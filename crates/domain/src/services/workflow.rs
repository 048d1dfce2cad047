//! Permit request workflow engine.
//!
//! Owns the request lifecycle: mode resolution at submission, the lazy
//! delayed-approval sweep, administrative approve/reject, and cancellation
//! by the owning student. Every read entry point sweeps first so time-based
//! transitions are visible as soon as anything is observed.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::approval_number::{ApprovalNumberIssuer, DEFAULT_PREFIX};
use super::roster_import::{parse_roster, ImportStudentsResponse};
use super::roster_sync::{NotifierError, RosterSyncNotifier, SyncOutcome};
use super::store::{
    Clock, PermitRequestStore, RemovedRows, SettingsStore, StoreError, StudentStore, SystemClock,
};
use crate::models::{
    parse_academic_year, parse_academic_year_start, AcademicCalendar, ApprovalMode,
    ApprovalPolicy, ApprovalSettings, ApprovalStamp, GateRosterItem, NewPermitRequest,
    PermitDocumentContext, PermitRequest, PermitRequestWithStudent, PermitStatistics,
    RequestFilter, RequestStatus, RequestType, SettingKey, Student,
};
use shared::validation::DELAY_MINUTES_RANGE;

/// Approver recorded for instant automatic approvals.
pub const SYSTEM_AUTO_APPROVER: &str = "system-auto";

/// Approver recorded for approvals made by the delayed sweep.
pub const SYSTEM_DELAY_APPROVER: &str = "system-delay";

/// Static workflow configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub approval_number_prefix: String,
    /// Offset of the school's local time from UTC, in hours.
    pub school_utc_offset_hours: i32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            approval_number_prefix: DEFAULT_PREFIX.to_string(),
            school_utc_offset_hours: 9,
        }
    }
}

impl WorkflowConfig {
    pub fn school_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.school_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Validation(String),

    #[error("a {0} request already exists for this student")]
    Duplicate(RequestType),

    #[error("student not found: {0}")]
    UnknownStudent(String),

    #[error(transparent)]
    Storage(StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("{0}")]
    Validation(String),

    #[error("request not found: {0}")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionError {
    #[error("{0}")]
    Validation(String),

    #[error("request not found: {0}")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Cancellation failures. Missing, foreign and non-cancellable requests
/// all report `NotPermitted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancellationError {
    #[error("no cancellable request found")]
    NotPermitted,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("request not found: {0}")]
    NotFound(i64),

    #[error("request {0} is not approved")]
    NotApproved(i64),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudentError {
    #[error("student not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub request: PermitRequest,
    pub sync: SyncOutcome,
}

impl SubmissionOutcome {
    pub fn message(&self) -> String {
        if self.request.status.is_approved() {
            format!(
                "{} request submitted and approved automatically",
                self.request.request_type.display_name()
            )
        } else {
            format!(
                "{} request submitted and waiting for approval",
                self.request.request_type.display_name()
            )
        }
    }
}

/// Result of approve or reject. `changed` is false when the request was
/// already in the target state.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub request: PermitRequest,
    pub changed: bool,
    pub sync: SyncOutcome,
}

/// Result of a cancellation: the deleted request.
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub request: PermitRequest,
    pub sync: SyncOutcome,
}

/// Rows removed with one or all students.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalOutcome {
    pub removed: RemovedRows,
    pub sync: SyncOutcome,
}

/// What one sweep pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub transitioned: Vec<i64>,
    pub gate_transitioned: usize,
    pub sync: SyncOutcome,
}

/// The approval workflow engine.
pub struct WorkflowEngine {
    requests: Arc<dyn PermitRequestStore>,
    settings: Arc<dyn SettingsStore>,
    students: Arc<dyn StudentStore>,
    notifier: Arc<dyn RosterSyncNotifier>,
    clock: Arc<dyn Clock>,
    issuer: ApprovalNumberIssuer,
    school_offset: FixedOffset,
}

impl WorkflowEngine {
    pub fn new(
        requests: Arc<dyn PermitRequestStore>,
        settings: Arc<dyn SettingsStore>,
        students: Arc<dyn StudentStore>,
        notifier: Arc<dyn RosterSyncNotifier>,
        config: &WorkflowConfig,
    ) -> Self {
        let school_offset = config.school_offset();
        Self {
            requests,
            settings,
            students,
            notifier,
            clock: Arc::new(SystemClock),
            issuer: ApprovalNumberIssuer::new(config.approval_number_prefix.clone(), school_offset),
            school_offset,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn school_offset(&self) -> FixedOffset {
        self.school_offset
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.school_offset).date_naive()
    }

    async fn load_settings(&self, now: DateTime<Utc>) -> Result<ApprovalSettings, StoreError> {
        let raw = self.settings.load_all().await?;
        Ok(ApprovalSettings::from_raw(&raw, self.today(now)))
    }

    fn stamp(
        &self,
        request_type: RequestType,
        status: RequestStatus,
        approver: &str,
        at: DateTime<Utc>,
    ) -> ApprovalStamp {
        ApprovalStamp {
            status,
            approved_at: at,
            approved_by: approver.to_string(),
            number: self.issuer.allocation_for(request_type, at),
        }
    }

    async fn publish_roster(&self, trigger: &'static str) -> SyncOutcome {
        let result = self.notifier.publish_gate_roster().await;
        match &result {
            Ok(rows) => {
                info!(rows = *rows, trigger, "Gate roster published");
                counter!("roster_sync_total", "outcome" => "success").increment(1);
            }
            Err(e) => {
                warn!(error = %e, trigger, "Gate roster publication failed");
                counter!("roster_sync_total", "outcome" => "failure").increment(1);
            }
        }
        SyncOutcome::from_result(result)
    }

    /// Submits a new request. The approval mode configured for the type
    /// decides whether it starts pending or auto-approved.
    pub async fn submit(
        &self,
        student_id: &str,
        request_type: RequestType,
        reason: &str,
        extra_info: Option<String>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let student_id = student_id.trim();
        let reason = reason.trim();
        if student_id.is_empty() {
            return Err(SubmissionError::Validation("Student id is required".to_string()));
        }
        if reason.is_empty() {
            return Err(SubmissionError::Validation("Reason is required".to_string()));
        }

        let now = self.clock.now();
        let settings = self
            .load_settings(now)
            .await
            .map_err(SubmissionError::Storage)?;
        let policy = settings.policy(request_type);

        let approval = (policy.mode == ApprovalMode::InstantAuto).then(|| {
            self.stamp(
                request_type,
                RequestStatus::AutoApproved,
                SYSTEM_AUTO_APPROVER,
                now,
            )
        });

        let new = NewPermitRequest {
            student_id: student_id.to_string(),
            request_type,
            reason: reason.to_string(),
            extra_info,
            submitted_at: now,
            approval,
        };

        let request = self.requests.insert(&new).await.map_err(|e| match e {
            StoreError::Duplicate => SubmissionError::Duplicate(request_type),
            StoreError::ForeignKey => SubmissionError::UnknownStudent(student_id.to_string()),
            other => SubmissionError::Storage(other),
        })?;

        counter!(
            "permit_requests_submitted_total",
            "type" => request_type.as_str(),
            "status" => request.status.as_str()
        )
        .increment(1);
        if request.status == RequestStatus::AutoApproved {
            counter!(
                "permit_requests_auto_approved_total",
                "type" => request_type.as_str(),
                "source" => "instant"
            )
            .increment(1);
        }

        info!(
            request_id = request.id,
            student_id = %request.student_id,
            request_type = %request_type,
            status = %request.status,
            mode = %policy.mode,
            "Permit request submitted"
        );

        let sync = if request.is_approved_gate() {
            self.publish_roster("submit").await
        } else {
            SyncOutcome::NotRequired
        };

        Ok(SubmissionOutcome { request, sync })
    }

    /// Auto-approves every pending request whose type is in delayed mode and
    /// whose delay has elapsed. Safe to run concurrently: each transition is
    /// guarded on the row still being pending. The roster is published at
    /// most once per pass and publication failures are only logged.
    ///
    /// A storage failure on one type or row does not stop the pass. The
    /// roster is still published for gate rows that did transition, and
    /// the first failure is returned afterwards.
    pub async fn sweep_delayed_approvals(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let settings = self.load_settings(now).await?;
        let mut report = SweepReport::default();
        let mut first_error: Option<StoreError> = None;

        for policy in settings.delayed() {
            let cutoff = now - Duration::minutes(policy.delay_minutes);
            let due = match self
                .requests
                .find_due_pending(policy.request_type, cutoff)
                .await
            {
                Ok(due) => due,
                Err(e) => {
                    warn!(
                        request_type = %policy.request_type,
                        error = %e,
                        "Sweep could not list due requests"
                    );
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            for id in due {
                let stamp = self.stamp(
                    policy.request_type,
                    RequestStatus::AutoApproved,
                    SYSTEM_DELAY_APPROVER,
                    now,
                );
                let transition = match self
                    .requests
                    .apply_approval(id, &[RequestStatus::Pending], &stamp)
                    .await
                {
                    Ok(Some(transition)) => transition,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(request_id = id, error = %e, "Delayed auto-approval failed");
                        first_error.get_or_insert(e);
                        continue;
                    }
                };

                counter!(
                    "permit_requests_auto_approved_total",
                    "type" => policy.request_type.as_str(),
                    "source" => "delayed"
                )
                .increment(1);
                info!(
                    request_id = id,
                    student_id = %transition.request.student_id,
                    request_type = %policy.request_type,
                    delay_minutes = policy.delay_minutes,
                    "Delayed auto-approval applied"
                );

                report.transitioned.push(id);
                if policy.request_type == RequestType::Gate {
                    report.gate_transitioned += 1;
                }
            }
        }

        if report.gate_transitioned > 0 {
            report.sync = self.publish_roster("sweep").await;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Approves a request. Accepted from pending, auto-approved and
    /// rejected; already-approved requests are left untouched. Gate
    /// requests receive a number on their first approval only.
    pub async fn approve(&self, id: i64, approver: &str) -> Result<TransitionOutcome, ApprovalError> {
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(ApprovalError::Validation("Approver is required".to_string()));
        }

        let current = self
            .requests
            .find_by_id(id)
            .await?
            .ok_or(ApprovalError::NotFound(id))?;

        if current.status == RequestStatus::Approved {
            return Ok(TransitionOutcome {
                request: current,
                changed: false,
                sync: SyncOutcome::NotRequired,
            });
        }

        let stamp = self.stamp(
            current.request_type,
            RequestStatus::Approved,
            approver,
            self.clock.now(),
        );
        let transition = self
            .requests
            .apply_approval(id, &RequestStatus::APPROVABLE, &stamp)
            .await?;

        let Some(transition) = transition else {
            // Changed or deleted between the read and the guarded update.
            let request = self
                .requests
                .find_by_id(id)
                .await?
                .ok_or(ApprovalError::NotFound(id))?;
            return Ok(TransitionOutcome {
                request,
                changed: false,
                sync: SyncOutcome::NotRequired,
            });
        };

        info!(
            request_id = id,
            previous = %transition.previous,
            approver = %approver,
            approval_number = ?transition.request.approval_number,
            "Permit request approved"
        );

        let sync = if transition.request.request_type == RequestType::Gate
            && !transition.previous.is_approved()
        {
            self.publish_roster("approve").await
        } else {
            SyncOutcome::NotRequired
        };

        Ok(TransitionOutcome {
            request: transition.request,
            changed: true,
            sync,
        })
    }

    /// Rejects a request with a reason. Accepted from pending, approved and
    /// auto-approved; already-rejected requests are left untouched.
    pub async fn reject(&self, id: i64, reason: &str) -> Result<TransitionOutcome, RejectionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RejectionError::Validation(
                "Rejection reason is required".to_string(),
            ));
        }

        let current = self
            .requests
            .find_by_id(id)
            .await?
            .ok_or(RejectionError::NotFound(id))?;

        if current.status == RequestStatus::Rejected {
            return Ok(TransitionOutcome {
                request: current,
                changed: false,
                sync: SyncOutcome::NotRequired,
            });
        }

        let Some(transition) = self
            .requests
            .apply_rejection(id, &RequestStatus::REJECTABLE, reason)
            .await?
        else {
            let request = self
                .requests
                .find_by_id(id)
                .await?
                .ok_or(RejectionError::NotFound(id))?;
            return Ok(TransitionOutcome {
                request,
                changed: false,
                sync: SyncOutcome::NotRequired,
            });
        };

        info!(
            request_id = id,
            previous = %transition.previous,
            "Permit request rejected"
        );

        let sync = if transition.request.request_type == RequestType::Gate
            && transition.previous.is_approved()
        {
            self.publish_roster("reject").await
        } else {
            SyncOutcome::NotRequired
        };

        Ok(TransitionOutcome {
            request: transition.request,
            changed: true,
            sync,
        })
    }

    /// Deletes a request owned by `student_id` while it is pending,
    /// approved or auto-approved.
    pub async fn cancel(
        &self,
        id: i64,
        student_id: &str,
    ) -> Result<CancellationOutcome, CancellationError> {
        let deleted = self
            .requests
            .delete_owned(id, student_id.trim(), &RequestStatus::CANCELLABLE)
            .await?
            .ok_or(CancellationError::NotPermitted)?;

        info!(
            request_id = id,
            student_id = %deleted.student_id,
            request_type = %deleted.request_type,
            status = %deleted.status,
            "Permit request cancelled"
        );

        let sync = if deleted.is_approved_gate() {
            self.publish_roster("cancel").await
        } else {
            SyncOutcome::NotRequired
        };

        Ok(CancellationOutcome {
            request: deleted,
            sync,
        })
    }

    pub async fn get_request(&self, id: i64) -> Result<PermitRequest, QueryError> {
        self.sweep_delayed_approvals().await?;
        self.requests
            .find_by_id(id)
            .await?
            .ok_or(QueryError::NotFound(id))
    }

    /// Fetches a request only if it belongs to `student_id`.
    pub async fn get_student_request(
        &self,
        id: i64,
        student_id: &str,
    ) -> Result<PermitRequest, QueryError> {
        let request = self.get_request(id).await?;
        if request.student_id != student_id.trim() {
            return Err(QueryError::NotFound(id));
        }
        Ok(request)
    }

    /// Requests with student context, newest first.
    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<PermitRequestWithStudent>, QueryError> {
        self.sweep_delayed_approvals().await?;
        Ok(self.requests.list(filter).await?)
    }

    pub async fn list_student_requests(
        &self,
        student_id: &str,
    ) -> Result<Vec<PermitRequest>, QueryError> {
        let filter = RequestFilter {
            student_id: Some(student_id.trim().to_string()),
            ..Default::default()
        };
        Ok(self
            .list_requests(&filter)
            .await?
            .into_iter()
            .map(|r| r.request)
            .collect())
    }

    /// Pending requests, oldest first.
    pub async fn pending_queue(&self) -> Result<Vec<PermitRequestWithStudent>, QueryError> {
        let filter = RequestFilter {
            status: Some(RequestStatus::Pending),
            ..Default::default()
        };
        let mut pending = self.list_requests(&filter).await?;
        pending.sort_by(|a, b| {
            a.request
                .submitted_at
                .cmp(&b.request.submitted_at)
                .then(a.request.id.cmp(&b.request.id))
        });
        Ok(pending)
    }

    pub async fn statistics(&self) -> Result<PermitStatistics, QueryError> {
        self.sweep_delayed_approvals().await?;
        let rows = self.requests.count_by_type_and_status().await?;
        let grades = self.requests.count_by_grade().await?;
        Ok(PermitStatistics::from_counts(&rows, grades))
    }

    /// Document data for an approved request owned by `student_id`.
    pub async fn permit_document(
        &self,
        id: i64,
        student_id: &str,
    ) -> Result<PermitDocumentContext, QueryError> {
        let request = self.get_student_request(id, student_id).await?;
        let student = self
            .students
            .find(&request.student_id)
            .await?
            .ok_or(QueryError::NotFound(id))?;
        let settings = self.load_settings(self.clock.now()).await?;

        PermitDocumentContext::build(
            &request,
            &student,
            &settings.calendar.period_text(),
            self.school_offset,
        )
        .ok_or(QueryError::NotApproved(id))
    }

    /// Resolved policy for every request type.
    pub async fn policies(&self) -> Result<Vec<ApprovalPolicy>, SettingsError> {
        Ok(self.load_settings(self.clock.now()).await?.policies())
    }

    /// Stores a new mode (and optionally delay) for a request type.
    pub async fn update_policy(
        &self,
        request_type: RequestType,
        mode: ApprovalMode,
        delay_minutes: Option<i64>,
    ) -> Result<ApprovalPolicy, SettingsError> {
        let mut entries = vec![(
            SettingKey::ApprovalMode(request_type).as_key(),
            mode.as_str().to_string(),
        )];
        if let Some(minutes) = delay_minutes {
            if !DELAY_MINUTES_RANGE.contains(&minutes) {
                return Err(SettingsError::Validation(
                    "Delay must be between 1 and 1440 minutes".to_string(),
                ));
            }
            entries.push((
                SettingKey::ApprovalDelayMinutes(request_type).as_key(),
                minutes.to_string(),
            ));
        }

        self.settings.save(&entries).await?;
        let policy = self
            .load_settings(self.clock.now())
            .await?
            .policy(request_type);

        info!(
            request_type = %request_type,
            mode = %policy.mode,
            delay_minutes = policy.delay_minutes,
            "Approval policy updated"
        );
        Ok(policy)
    }

    /// Publishes the gate roster on demand, returning the raw result.
    pub async fn sync_roster(&self) -> Result<usize, NotifierError> {
        let rows = self.notifier.publish_gate_roster().await;
        let outcome = if rows.is_ok() { "success" } else { "failure" };
        counter!("roster_sync_total", "outcome" => outcome).increment(1);
        rows
    }

    /// Approved gate permits as they appear on the published roster.
    pub async fn gate_roster(&self) -> Result<Vec<GateRosterItem>, QueryError> {
        self.sweep_delayed_approvals().await?;
        let entries = self.requests.gate_roster().await?;
        Ok(entries.iter().map(GateRosterItem::from).collect())
    }

    pub async fn academic_calendar(&self) -> Result<AcademicCalendar, SettingsError> {
        Ok(self.load_settings(self.clock.now()).await?.calendar)
    }

    /// Stores the academic year (four digits) and/or its start date
    /// (`YYYY-MM-DD`). Both values are validated before anything is saved.
    pub async fn update_academic_calendar(
        &self,
        academic_year: Option<&str>,
        academic_year_start: Option<&str>,
    ) -> Result<AcademicCalendar, SettingsError> {
        let mut entries = Vec::new();
        if let Some(raw) = academic_year {
            let year = parse_academic_year(raw).ok_or_else(|| {
                SettingsError::Validation("Academic year must be four digits".to_string())
            })?;
            entries.push((SettingKey::AcademicYear.as_key(), year.to_string()));
        }
        if let Some(raw) = academic_year_start {
            let start = parse_academic_year_start(raw).ok_or_else(|| {
                SettingsError::Validation("Academic year start must be YYYY-MM-DD".to_string())
            })?;
            entries.push((
                SettingKey::AcademicYearStart.as_key(),
                start.format("%Y-%m-%d").to_string(),
            ));
        }
        if entries.is_empty() {
            return Err(SettingsError::Validation(
                "Provide academic_year or academic_year_start".to_string(),
            ));
        }

        self.settings.save(&entries).await?;
        let calendar = self.academic_calendar().await?;

        info!(
            academic_year = calendar.year,
            start = %calendar.start,
            "Academic calendar updated"
        );
        Ok(calendar)
    }

    /// Every student, ordered by grade, class and name.
    pub async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        self.students.list_all().await
    }

    /// Deletes a student together with all of their requests.
    pub async fn delete_student(&self, student_id: &str) -> Result<RemovalOutcome, StudentError> {
        let student_id = student_id.trim();
        let removed = self.students.remove(student_id).await?;
        if removed.students == 0 {
            return Err(StudentError::NotFound(student_id.to_string()));
        }

        info!(
            student_id = %student_id,
            requests = removed.requests,
            "Student deleted"
        );
        let sync = self.sync_after_removal(&removed, "delete_student").await;
        Ok(RemovalOutcome { removed, sync })
    }

    /// Deletes every request and every student.
    pub async fn clear_students(&self) -> Result<RemovalOutcome, StoreError> {
        let removed = self.students.remove_all().await?;

        warn!(
            students = removed.students,
            requests = removed.requests,
            "Student roster cleared"
        );
        let sync = self.sync_after_removal(&removed, "clear_students").await;
        Ok(RemovalOutcome { removed, sync })
    }

    async fn sync_after_removal(&self, removed: &RemovedRows, trigger: &'static str) -> SyncOutcome {
        if removed.approved_gate > 0 {
            self.publish_roster(trigger).await
        } else {
            SyncOutcome::NotRequired
        }
    }

    /// Parses and stores roster rows. Invalid rows are reported, valid rows
    /// are upserted.
    pub async fn import_students(
        &self,
        rows: &[Vec<String>],
    ) -> Result<ImportStudentsResponse, StoreError> {
        let parsed = parse_roster(rows);
        let imported = if parsed.students.is_empty() {
            0
        } else {
            self.students.upsert_many(&parsed.students).await?
        };

        info!(
            imported,
            rejected = parsed.errors.len(),
            "Student roster imported"
        );

        Ok(ImportStudentsResponse {
            imported,
            errors: parsed.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DismissalSlot, GateRosterEntry, GateSchedule, GradeCount, StatusTransition, Student,
        TypeStatusCount, Weekday,
    };
    use crate::services::memory::MemoryStore;
    use crate::services::roster_sync::MockRosterSyncNotifier;
    use crate::services::store::ManualClock;
    use chrono::TimeZone;
    use fake::faker::name::en::Name;
    use fake::Fake;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to a memory store but fails the n-th approval write.
    struct FailingApprovals {
        inner: Arc<MemoryStore>,
        approvals: AtomicUsize,
        fail_on: usize,
    }

    impl FailingApprovals {
        fn new(inner: Arc<MemoryStore>, fail_on: usize) -> Self {
            Self {
                inner,
                approvals: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait::async_trait]
    impl PermitRequestStore for FailingApprovals {
        async fn insert(&self, new: &NewPermitRequest) -> Result<PermitRequest, StoreError> {
            self.inner.insert(new).await
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<PermitRequest>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn list(
            &self,
            filter: &RequestFilter,
        ) -> Result<Vec<PermitRequestWithStudent>, StoreError> {
            self.inner.list(filter).await
        }

        async fn find_due_pending(
            &self,
            request_type: RequestType,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<i64>, StoreError> {
            self.inner.find_due_pending(request_type, cutoff).await
        }

        async fn apply_approval(
            &self,
            id: i64,
            from: &[RequestStatus],
            stamp: &ApprovalStamp,
        ) -> Result<Option<StatusTransition>, StoreError> {
            if self.approvals.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Database("boom".to_string()));
            }
            self.inner.apply_approval(id, from, stamp).await
        }

        async fn apply_rejection(
            &self,
            id: i64,
            from: &[RequestStatus],
            reason: &str,
        ) -> Result<Option<StatusTransition>, StoreError> {
            self.inner.apply_rejection(id, from, reason).await
        }

        async fn delete_owned(
            &self,
            id: i64,
            student_id: &str,
            from: &[RequestStatus],
        ) -> Result<Option<PermitRequest>, StoreError> {
            self.inner.delete_owned(id, student_id, from).await
        }

        async fn count_by_type_and_status(&self) -> Result<Vec<TypeStatusCount>, StoreError> {
            self.inner.count_by_type_and_status().await
        }

        async fn count_by_grade(&self) -> Result<Vec<GradeCount>, StoreError> {
            self.inner.count_by_grade().await
        }

        async fn gate_roster(&self) -> Result<Vec<GateRosterEntry>, StoreError> {
            self.inner.gate_roster().await
        }
    }

    struct Harness {
        engine: WorkflowEngine,
        store: Arc<MemoryStore>,
        notifier: Arc<MockRosterSyncNotifier>,
        clock: Arc<ManualClock>,
    }

    fn start() -> DateTime<Utc> {
        // 10:00 in Seoul.
        Utc.with_ymd_and_hms(2025, 3, 10, 1, 0, 0).unwrap()
    }

    async fn harness_with(notifier: MockRosterSyncNotifier) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let clock = Arc::new(ManualClock::new(start()));

        let students: Vec<Student> = ["S1", "S2", "S3"]
            .iter()
            .enumerate()
            .map(|(i, id)| Student::new(*id, Name().fake::<String>(), i as i32 + 1, 1))
            .collect();
        StudentStore::upsert_many(&*store, &students).await.unwrap();

        let engine = WorkflowEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            &WorkflowConfig::default(),
        )
        .with_clock(clock.clone());

        Harness {
            engine,
            store,
            notifier,
            clock,
        }
    }

    async fn harness() -> Harness {
        harness_with(MockRosterSyncNotifier::new()).await
    }

    async fn set_mode(h: &Harness, request_type: RequestType, mode: &str, delay: Option<&str>) {
        let mut entries = vec![(
            SettingKey::ApprovalMode(request_type).as_key(),
            mode.to_string(),
        )];
        if let Some(delay) = delay {
            entries.push((
                SettingKey::ApprovalDelayMinutes(request_type).as_key(),
                delay.to_string(),
            ));
        }
        h.store.save(&entries).await.unwrap();
    }

    fn schedule() -> Option<String> {
        Some(
            GateSchedule::new([Weekday::Mon], [(Weekday::Tue, DismissalSlot::Second)])
                .to_extra_info(),
        )
    }

    #[tokio::test]
    async fn test_manual_mode_leaves_requests_pending() {
        let h = harness().await;
        for (i, t) in RequestType::ALL.into_iter().enumerate() {
            set_mode(&h, t, "manual", None).await;
            let out = h
                .engine
                .submit(["S1", "S2", "S3"][i], t, "needed", schedule())
                .await
                .unwrap();
            assert_eq!(out.request.status, RequestStatus::Pending);
            assert!(out.request.approval_number.is_none());
            assert!(out.request.approved_at.is_none());
            assert_eq!(out.sync, SyncOutcome::NotRequired);
        }
        assert_eq!(h.notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_instant_auto_numbers_only_gate() {
        let h = harness().await;
        for t in RequestType::ALL {
            set_mode(&h, t, "instant_auto", None).await;
            let out = h.engine.submit("S1", t, "needed", schedule()).await.unwrap();
            assert_eq!(out.request.status, RequestStatus::AutoApproved);
            assert_eq!(out.request.approved_by.as_deref(), Some(SYSTEM_AUTO_APPROVER));
            assert_eq!(out.request.approved_at, Some(start()));
            assert_eq!(
                out.request.approval_number.is_some(),
                t == RequestType::Gate
            );
        }
        assert_eq!(h.notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_legacy_auto_alias_is_instant() {
        let h = harness().await;
        set_mode(&h, RequestType::Tablet, "auto", None).await;
        let out = h
            .engine
            .submit("S1", RequestType::Tablet, "needed", None)
            .await
            .unwrap();
        assert_eq!(out.request.status, RequestStatus::AutoApproved);
    }

    #[tokio::test]
    async fn test_duplicate_submission_fails() {
        let h = harness().await;
        let first = h
            .engine
            .submit("S1", RequestType::Phone, "first", None)
            .await
            .unwrap();
        let err = h
            .engine
            .submit("S1", RequestType::Phone, "second", None)
            .await
            .unwrap_err();
        assert_eq!(err, SubmissionError::Duplicate(RequestType::Phone));

        // Other types and other students are unaffected.
        assert!(h.engine.submit("S1", RequestType::Tablet, "r", None).await.is_ok());
        assert!(h.engine.submit("S2", RequestType::Phone, "r", None).await.is_ok());

        // Once cancelled the pair is free again.
        h.engine.cancel(first.request.id, "S1").await.unwrap();
        assert!(h.engine.submit("S1", RequestType::Phone, "again", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let h = harness().await;
        assert!(matches!(
            h.engine.submit("S1", RequestType::Phone, "   ", None).await,
            Err(SubmissionError::Validation(_))
        ));
        assert!(matches!(
            h.engine.submit("", RequestType::Phone, "r", None).await,
            Err(SubmissionError::Validation(_))
        ));
        assert_eq!(
            h.engine
                .submit("nobody", RequestType::Phone, "r", None)
                .await
                .unwrap_err(),
            SubmissionError::UnknownStudent("nobody".to_string())
        );
    }

    #[tokio::test]
    async fn test_delayed_gate_approval_waits_for_delay() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "delayed_auto", Some("10")).await;
        let id = h
            .engine
            .submit("S2", RequestType::Gate, "walks home", schedule())
            .await
            .unwrap()
            .request
            .id;

        h.clock.advance(Duration::minutes(10) - Duration::seconds(1));
        let request = h.engine.get_request(id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(h.notifier.calls(), 0);

        h.clock.advance(Duration::seconds(1));
        let request = h.engine.get_request(id).await.unwrap();
        assert_eq!(request.status, RequestStatus::AutoApproved);
        assert_eq!(request.approved_by.as_deref(), Some(SYSTEM_DELAY_APPROVER));
        assert_eq!(request.approved_at, Some(start() + Duration::minutes(10)));
        assert_eq!(request.approval_number.as_deref(), Some("DS-GATE-2025-0001"));
        assert_eq!(h.notifier.calls(), 1);

        // Later sweeps find nothing to do.
        h.clock.advance(Duration::hours(1));
        let report = h.engine.sweep_delayed_approvals().await.unwrap();
        assert!(report.transitioned.is_empty());
        assert_eq!(h.notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_transition_once() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "delayed_approve", Some("10")).await;
        h.engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(15));

        let (a, b) = tokio::join!(
            h.engine.sweep_delayed_approvals(),
            h.engine.sweep_delayed_approvals()
        );
        let total = a.unwrap().transitioned.len() + b.unwrap().transitioned.len();
        assert_eq!(total, 1);
        assert_eq!(h.notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_publishes_once_for_many_rows() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "delayed_auto", Some("5")).await;
        let first = h
            .engine
            .submit("S3", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request
            .id;
        h.clock.advance(Duration::minutes(1));
        let second = h
            .engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request
            .id;
        h.clock.advance(Duration::minutes(30));

        let report = h.engine.sweep_delayed_approvals().await.unwrap();
        assert_eq!(report.transitioned, vec![first, second]);
        assert_eq!(report.gate_transitioned, 2);
        assert_eq!(report.sync, SyncOutcome::Published(0));
        assert_eq!(h.notifier.calls(), 1);

        let mut numbers = Vec::new();
        for id in [first, second] {
            let request = h.store.find_by_id(id).await.unwrap().unwrap();
            numbers.push(request.approval_number.unwrap_or_default());
        }
        assert_eq!(numbers, vec!["DS-GATE-2025-0001", "DS-GATE-2025-0002"]);
    }

    #[tokio::test]
    async fn test_sweep_ignores_other_modes() {
        let h = harness().await;
        set_mode(&h, RequestType::Phone, "manual", Some("1")).await;
        let id = h
            .engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;
        h.clock.advance(Duration::days(2));
        let report = h.engine.sweep_delayed_approvals().await.unwrap();
        assert!(report.transitioned.is_empty());
        assert_eq!(
            h.engine.get_request(id).await.unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_delayed_non_gate_does_not_notify() {
        let h = harness().await;
        set_mode(&h, RequestType::Tablet, "delayed_auto", None).await;
        let id = h
            .engine
            .submit("S1", RequestType::Tablet, "r", None)
            .await
            .unwrap()
            .request
            .id;
        // Default delay is 10 minutes.
        h.clock.advance(Duration::minutes(10));
        let request = h.engine.get_request(id).await.unwrap();
        assert_eq!(request.status, RequestStatus::AutoApproved);
        assert!(request.approval_number.is_none());
        assert_eq!(h.notifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_sweep_swallows_notifier_failure() {
        let h = harness_with(MockRosterSyncNotifier::failing()).await;
        set_mode(&h, RequestType::Gate, "delayed_auto", Some("1")).await;
        h.engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(1));

        let listed = h.engine.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(listed[0].request.status, RequestStatus::AutoApproved);
        assert_eq!(h.notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_number_sequence_per_year() {
        let h = harness().await;
        let mut ids = Vec::new();
        for student in ["S1", "S2", "S3"] {
            ids.push(
                h.engine
                    .submit(student, RequestType::Gate, "r", schedule())
                    .await
                    .unwrap()
                    .request
                    .id,
            );
        }

        let a = h.engine.approve(ids[0], "Admin").await.unwrap();
        let b = h.engine.approve(ids[1], "Admin").await.unwrap();
        assert_eq!(a.request.approval_number.as_deref(), Some("DS-GATE-2025-0001"));
        assert_eq!(b.request.approval_number.as_deref(), Some("DS-GATE-2025-0002"));

        h.clock.set(Utc.with_ymd_and_hms(2026, 1, 5, 1, 0, 0).unwrap());
        let c = h.engine.approve(ids[2], "Admin").await.unwrap();
        assert_eq!(c.request.approval_number.as_deref(), Some("DS-GATE-2026-0001"));
        assert_eq!(h.notifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_approve_is_noop_when_already_approved() {
        let h = harness().await;
        let id = h
            .engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;

        let first = h.engine.approve(id, "Admin").await.unwrap();
        assert!(first.changed);
        assert_eq!(first.request.status, RequestStatus::Approved);

        h.clock.advance(Duration::hours(1));
        let second = h.engine.approve(id, "Other").await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.request.approved_by.as_deref(), Some("Admin"));
        assert_eq!(second.request.approved_at, Some(start()));
    }

    #[tokio::test]
    async fn test_reapproval_keeps_number() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "instant_auto", None).await;
        let submitted = h
            .engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request;
        let number = submitted.approval_number.clone();
        assert!(number.is_some());

        // auto_approved -> approved does not change the roster.
        let approved = h.engine.approve(submitted.id, "Admin").await.unwrap();
        assert_eq!(approved.request.approval_number, number);
        assert_eq!(approved.sync, SyncOutcome::NotRequired);

        let rejected = h.engine.reject(submitted.id, "wrong schedule").await.unwrap();
        assert_eq!(rejected.request.status, RequestStatus::Rejected);
        assert_eq!(rejected.request.approval_number, number);
        assert!(rejected.request.approved_at.is_none());
        assert!(rejected.request.approved_by.is_none());
        assert_eq!(rejected.sync, SyncOutcome::Published(0));

        let again = h.engine.approve(submitted.id, "Admin2").await.unwrap();
        assert!(again.changed);
        assert_eq!(again.request.approval_number, number);
        assert_eq!(again.request.approved_by.as_deref(), Some("Admin2"));
        assert!(again.request.rejection_reason.is_none());
        // submit, reject, re-approve
        assert_eq!(h.notifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_reject_rules() {
        let h = harness().await;
        let id = h
            .engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;

        assert!(matches!(
            h.engine.reject(id, " ").await,
            Err(RejectionError::Validation(_))
        ));

        let rejected = h.engine.reject(id, "no reason given").await.unwrap();
        assert!(rejected.changed);
        assert_eq!(
            rejected.request.rejection_reason.as_deref(),
            Some("no reason given")
        );
        assert_eq!(rejected.sync, SyncOutcome::NotRequired);

        let again = h.engine.reject(id, "other").await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.request.rejection_reason.as_deref(), Some("no reason given"));
    }

    #[tokio::test]
    async fn test_missing_request() {
        let h = harness().await;
        assert_eq!(
            h.engine.approve(99, "Admin").await.unwrap_err(),
            ApprovalError::NotFound(99)
        );
        assert_eq!(
            h.engine.reject(99, "r").await.unwrap_err(),
            RejectionError::NotFound(99)
        );
        assert_eq!(
            h.engine.get_request(99).await.unwrap_err(),
            QueryError::NotFound(99)
        );
        assert!(matches!(
            h.engine.approve(1, "").await,
            Err(ApprovalError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_rules() {
        let h = harness().await;
        let pending = h
            .engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;
        let rejected = h
            .engine
            .submit("S1", RequestType::Tablet, "r", None)
            .await
            .unwrap()
            .request
            .id;
        h.engine.reject(rejected, "no").await.unwrap();

        assert_eq!(
            h.engine.cancel(rejected, "S1").await.unwrap_err(),
            CancellationError::NotPermitted
        );

        let wrong_owner = h.engine.cancel(pending, "S2").await.unwrap_err();
        let missing = h.engine.cancel(12345, "S2").await.unwrap_err();
        assert_eq!(wrong_owner, missing);

        let out = h.engine.cancel(pending, "S1").await.unwrap();
        assert_eq!(out.request.id, pending);
        assert_eq!(out.sync, SyncOutcome::NotRequired);
        assert!(h.store.find_by_id(pending).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_approved_gate_republishes() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "instant_auto", None).await;
        let id = h
            .engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request
            .id;
        let out = h.engine.cancel(id, "S1").await.unwrap();
        assert_eq!(out.sync, SyncOutcome::Published(0));
        assert_eq!(h.notifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_phone_manual_scenario() {
        let h = harness().await;
        set_mode(&h, RequestType::Phone, "manual", None).await;

        let submitted = h
            .engine
            .submit("S1", RequestType::Phone, "after-school academy", None)
            .await
            .unwrap();
        assert_eq!(submitted.request.status, RequestStatus::Pending);

        let approved = h.engine.approve(submitted.request.id, "Admin").await.unwrap();
        assert_eq!(approved.request.status, RequestStatus::Approved);
        assert!(approved.request.approved_at.is_some());
        assert_eq!(approved.request.approved_by.as_deref(), Some("Admin"));
        assert!(approved.request.approval_number.is_none());

        h.engine.cancel(submitted.request.id, "S1").await.unwrap();
        assert!(h.engine.list_student_requests("S1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gate_instant_scenario() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "instant_auto", None).await;

        let out = h
            .engine
            .submit("S2", RequestType::Gate, "walks home", schedule())
            .await
            .unwrap();
        assert_eq!(out.request.status, RequestStatus::AutoApproved);
        assert_eq!(out.request.approval_number.as_deref(), Some("DS-GATE-2025-0001"));
        assert_eq!(h.notifier.calls(), 1);
        assert_eq!(
            out.sync.advisory().as_deref(),
            Some("Gate roster synced (0 rows)")
        );
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_submission() {
        let h = harness_with(MockRosterSyncNotifier::failing()).await;
        set_mode(&h, RequestType::Gate, "instant_auto", None).await;

        let out = h
            .engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap();
        assert!(out.sync.is_failure());
        assert!(h.store.find_by_id(out.request.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_statistics_reflect_sweep() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "delayed_auto", Some("10")).await;
        h.engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap();
        h.engine
            .submit("S2", RequestType::Phone, "r", None)
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(10));

        let stats = h.engine.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.auto_approved, 1);
        assert_eq!(stats.by_status.pending, 1);
        assert_eq!(stats.by_grade.len(), 2);
    }

    #[tokio::test]
    async fn test_pending_queue_oldest_first() {
        let h = harness().await;
        let first = h
            .engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;
        h.clock.advance(Duration::minutes(1));
        let second = h
            .engine
            .submit("S2", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;

        let queue = h.engine.pending_queue().await.unwrap();
        let ids: Vec<i64> = queue.iter().map(|r| r.request.id).collect();
        assert_eq!(ids, vec![first, second]);

        let listed = h.engine.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(listed[0].request.id, second);
    }

    #[tokio::test]
    async fn test_permit_document() {
        let h = harness().await;
        h.store
            .save(&[
                ("academic_year".to_string(), "2025".to_string()),
                ("academic_year_start".to_string(), "2025-03-04".to_string()),
            ])
            .await
            .unwrap();
        let id = h
            .engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request
            .id;

        assert_eq!(
            h.engine.permit_document(id, "S1").await.unwrap_err(),
            QueryError::NotApproved(id)
        );

        h.engine.approve(id, "Admin").await.unwrap();
        let doc = h.engine.permit_document(id, "S1").await.unwrap();
        assert_eq!(doc.approval_number.as_deref(), Some("DS-GATE-2025-0001"));
        assert_eq!(doc.period_text.as_deref(), Some("2025.3.4 ~ 2026.2.28"));
        assert_eq!(doc.schedule_text, "등교: 월 / 하교: 화2하교");

        assert_eq!(
            h.engine.permit_document(id, "S2").await.unwrap_err(),
            QueryError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn test_update_policy() {
        let h = harness().await;
        let policy = h
            .engine
            .update_policy(RequestType::Gate, ApprovalMode::DelayedAuto, Some(30))
            .await
            .unwrap();
        assert_eq!(policy.mode, ApprovalMode::DelayedAuto);
        assert_eq!(policy.delay_minutes, 30);

        assert!(matches!(
            h.engine
                .update_policy(RequestType::Gate, ApprovalMode::DelayedAuto, Some(0))
                .await,
            Err(SettingsError::Validation(_))
        ));

        let policies = h.engine.policies().await.unwrap();
        assert_eq!(policies.len(), 3);
        assert_eq!(policies[2].delay_minutes, 30);
        assert_eq!(policies[0].mode, ApprovalMode::Manual);
    }

    #[tokio::test]
    async fn test_import_students() {
        let h = harness().await;
        let rows = vec![
            vec!["학번".to_string(), "이름".to_string(), "학년".to_string(), "반".to_string()],
            vec!["S9".to_string(), "Park".to_string(), "2".to_string(), "3".to_string()],
            vec!["S9".to_string(), "Dup".to_string(), "2".to_string(), "3".to_string()],
        ];
        let result = h.engine.import_students(&rows).await.unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(h
            .engine
            .submit("S9", RequestType::Phone, "r", None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_sweep_failure_still_publishes_transitioned_rows() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "delayed_auto", Some("10")).await;
        let first = h
            .engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request
            .id;
        h.clock.advance(Duration::minutes(1));
        let second = h
            .engine
            .submit("S2", RequestType::Gate, "r", schedule())
            .await
            .unwrap()
            .request
            .id;
        h.clock.advance(Duration::minutes(30));

        let engine = WorkflowEngine::new(
            Arc::new(FailingApprovals::new(h.store.clone(), 2)),
            h.store.clone(),
            h.store.clone(),
            h.notifier.clone(),
            &WorkflowConfig::default(),
        )
        .with_clock(h.clock.clone());

        let err = engine.sweep_delayed_approvals().await.unwrap_err();
        assert_eq!(err, StoreError::Database("boom".to_string()));
        let s1 = h.store.find_by_id(first).await.unwrap().unwrap();
        assert_eq!(s1.status, RequestStatus::AutoApproved);
        let s2 = h.store.find_by_id(second).await.unwrap().unwrap();
        assert_eq!(s2.status, RequestStatus::Pending);
        assert_eq!(h.notifier.calls(), 1);

        // The next pass picks up the row that failed.
        let report = engine.sweep_delayed_approvals().await.unwrap();
        assert_eq!(report.transitioned, vec![second]);
        assert_eq!(h.notifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_gate_roster_view_sweeps_but_does_not_publish() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "delayed_auto", Some("10")).await;
        set_mode(&h, RequestType::Phone, "instant_auto", None).await;
        h.engine
            .submit("S2", RequestType::Gate, "walks home", schedule())
            .await
            .unwrap();
        h.engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap();

        assert!(h.engine.gate_roster().await.unwrap().is_empty());

        h.clock.advance(Duration::minutes(10));
        let roster = h.engine.gate_roster().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].student_id, "S2");
        assert_eq!(roster[0].morning, [true, false, false, false, false]);
        // Only the sweep's own publication.
        assert_eq!(h.notifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_update_academic_calendar() {
        let h = harness().await;
        assert_eq!(h.engine.academic_calendar().await.unwrap().year, 2025);

        let calendar = h
            .engine
            .update_academic_calendar(Some("2026"), None)
            .await
            .unwrap();
        assert_eq!(calendar.year, 2026);
        assert_eq!(calendar.start, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());

        let calendar = h
            .engine
            .update_academic_calendar(None, Some(" 2026-03-03 "))
            .await
            .unwrap();
        assert_eq!(calendar.start, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(calendar.period_text(), "2026.3.3 ~ 2027.2.28");
    }

    #[tokio::test]
    async fn test_invalid_calendar_update_saves_nothing() {
        let h = harness().await;
        for (year, start) in [
            (Some("26"), None),
            (None, Some("2026/03/02")),
            (Some("2027"), Some("2027-3-2")),
            (None, None),
        ] {
            assert!(matches!(
                h.engine.update_academic_calendar(year, start).await,
                Err(SettingsError::Validation(_))
            ));
        }
        assert_eq!(h.engine.academic_calendar().await.unwrap().year, 2025);
    }

    #[tokio::test]
    async fn test_list_students_ordered_by_grade() {
        let h = harness().await;
        StudentStore::upsert_many(&*h.store, &[Student::new("S0", "Ahn", 1, 1)])
            .await
            .unwrap();
        let ids: Vec<String> = h
            .engine
            .list_students()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(&ids[2..], ["S2", "S3"]);
    }

    #[tokio::test]
    async fn test_delete_student_removes_requests_and_republishes() {
        let h = harness().await;
        set_mode(&h, RequestType::Gate, "instant_auto", None).await;
        h.engine
            .submit("S1", RequestType::Gate, "r", schedule())
            .await
            .unwrap();
        h.engine
            .submit("S1", RequestType::Phone, "r", None)
            .await
            .unwrap();
        h.engine
            .submit("S2", RequestType::Phone, "r", None)
            .await
            .unwrap();
        assert_eq!(h.notifier.calls(), 1);

        let out = h.engine.delete_student(" S1 ").await.unwrap();
        assert_eq!(
            out.removed,
            RemovedRows {
                students: 1,
                requests: 2,
                approved_gate: 1,
            }
        );
        assert_eq!(out.sync, SyncOutcome::Published(0));
        assert_eq!(h.notifier.calls(), 2);

        let remaining = h.engine.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            h.engine.delete_student("S1").await.unwrap_err(),
            StudentError::NotFound("S1".to_string())
        );
    }

    #[tokio::test]
    async fn test_clear_students() {
        let h = harness().await;
        h.engine
            .submit("S2", RequestType::Tablet, "r", None)
            .await
            .unwrap();

        let out = h.engine.clear_students().await.unwrap();
        assert_eq!(out.removed.students, 3);
        assert_eq!(out.removed.requests, 1);
        assert_eq!(out.sync, SyncOutcome::NotRequired);
        assert_eq!(h.notifier.calls(), 0);
        assert!(h.engine.list_students().await.unwrap().is_empty());
        assert!(h
            .engine
            .list_requests(&RequestFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_student_lookup_ignores_surrounding_whitespace() {
        let h = harness().await;
        let id = h
            .engine
            .submit("S3", RequestType::Phone, "r", None)
            .await
            .unwrap()
            .request
            .id;
        assert_eq!(h.engine.get_student_request(id, " S3 ").await.unwrap().id, id);
        assert_eq!(h.engine.list_student_requests("S3 ").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let h = harness().await;
        h.store.set_unavailable(true);
        assert!(matches!(
            h.engine.list_requests(&RequestFilter::default()).await,
            Err(QueryError::Storage(StoreError::Transient(_)))
        ));
        assert!(matches!(
            h.engine.submit("S1", RequestType::Phone, "r", None).await,
            Err(SubmissionError::Storage(_))
        ));
    }
}
