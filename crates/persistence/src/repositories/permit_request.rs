//! Permit request repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use domain::models::{
    ApprovalStamp, GateRosterEntry, GradeCount, NewPermitRequest, PermitRequest,
    PermitRequestWithStudent, RequestFilter, RequestStatus, RequestType, StatusTransition,
    TypeStatusCount,
};
use domain::services::{NumberAllocation, PermitRequestStore, StoreError};

use crate::entities::{
    GateRosterEntity, GradeCountEntity, PermitRequestEntity, PermitRequestWithStudentEntity,
    RequestStatusDb, RequestTypeDb, TypeStatusCountEntity,
};
use crate::error::with_retry;
use crate::metrics::QueryTimer;

/// Repository for permit request database operations.
#[derive(Clone)]
pub struct PermitRequestRepository {
    pool: PgPool,
}

/// Draws the next value of the (type, year) approval-number counter. The
/// row lock taken by the upsert serializes concurrent approvals until the
/// surrounding transaction ends.
async fn next_approval_number(
    tx: &mut Transaction<'_, Postgres>,
    allocation: &NumberAllocation,
) -> Result<String, sqlx::Error> {
    let sequence = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO approval_sequences (request_type, year, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (request_type, year)
        DO UPDATE SET last_value = approval_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(RequestTypeDb::from(allocation.request_type))
    .bind(allocation.year)
    .fetch_one(&mut **tx)
    .await?;

    Ok(allocation.render(sequence))
}

impl PermitRequestRepository {
    /// Creates a new PermitRequestRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a request, drawing an approval number first when the request
    /// is created already approved.
    pub async fn create(&self, new: &NewPermitRequest) -> Result<PermitRequestEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_permit_request");
        let mut tx = self.pool.begin().await?;

        let approval_number = match new.approval.as_ref().and_then(|a| a.number.as_ref()) {
            Some(allocation) => Some(next_approval_number(&mut tx, allocation).await?),
            None => None,
        };
        let status = new
            .approval
            .as_ref()
            .map(|a| a.status)
            .unwrap_or(RequestStatus::Pending);

        let entity = sqlx::query_as::<_, PermitRequestEntity>(
            r#"
            INSERT INTO permit_requests
                (student_id, request_type, reason, extra_info, status, approval_number,
                 submitted_at, approved_at, approved_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, student_id, request_type, reason, extra_info, status, approval_number,
                      submitted_at, approved_at, approved_by, rejection_reason
            "#,
        )
        .bind(&new.student_id)
        .bind(RequestTypeDb::from(new.request_type))
        .bind(&new.reason)
        .bind(&new.extra_info)
        .bind(RequestStatusDb::from(status))
        .bind(approval_number)
        .bind(new.submitted_at)
        .bind(new.approval.as_ref().map(|a| a.approved_at))
        .bind(new.approval.as_ref().map(|a| a.approved_by.clone()))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    /// Find a request by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<PermitRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_permit_request_by_id");
        let result = sqlx::query_as::<_, PermitRequestEntity>(
            r#"
            SELECT id, student_id, request_type, reason, extra_info, status, approval_number,
                   submitted_at, approved_at, approved_by, rejection_reason
            FROM permit_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List requests joined with their students, newest first.
    pub async fn list(
        &self,
        status: Option<RequestStatusDb>,
        request_type: Option<RequestTypeDb>,
        student_id: Option<&str>,
    ) -> Result<Vec<PermitRequestWithStudentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_permit_requests");
        let result = sqlx::query_as::<_, PermitRequestWithStudentEntity>(
            r#"
            SELECT r.id, r.student_id, r.request_type, r.reason, r.extra_info, r.status,
                   r.approval_number, r.submitted_at, r.approved_at, r.approved_by,
                   r.rejection_reason,
                   s.name AS student_name, s.grade, s.class_num
            FROM permit_requests r
            JOIN students s ON s.id = r.student_id
            WHERE ($1::permit_request_status IS NULL OR r.status = $1)
              AND ($2::permit_request_type IS NULL OR r.request_type = $2)
              AND ($3::text IS NULL OR r.student_id = $3)
            ORDER BY r.submitted_at DESC, r.id DESC
            "#,
        )
        .bind(status)
        .bind(request_type)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Ids of pending requests of a type submitted at or before `cutoff`,
    /// oldest first.
    pub async fn find_due_pending(
        &self,
        request_type: RequestTypeDb,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let timer = QueryTimer::new("find_due_pending_permit_requests");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id
            FROM permit_requests
            WHERE request_type = $1 AND status = 'pending' AND submitted_at <= $2
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .bind(request_type)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Lock the row and return its status if it is one of `from`.
    async fn lock_in_states(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        from: &[RequestStatus],
    ) -> Result<Option<PermitRequestEntity>, sqlx::Error> {
        sqlx::query_as::<_, PermitRequestEntity>(
            r#"
            SELECT id, student_id, request_type, reason, extra_info, status, approval_number,
                   submitted_at, approved_at, approved_by, rejection_reason
            FROM permit_requests
            WHERE id = $1 AND status = ANY($2)
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(RequestStatusDb::many(from))
        .fetch_optional(&mut **tx)
        .await
    }

    /// Stamp an approval on a request still in one of `from`. Returns the
    /// previous status and the updated row.
    pub async fn approve(
        &self,
        id: i64,
        from: &[RequestStatus],
        stamp: &ApprovalStamp,
    ) -> Result<Option<(RequestStatusDb, PermitRequestEntity)>, sqlx::Error> {
        let timer = QueryTimer::new("approve_permit_request");
        let mut tx = self.pool.begin().await?;

        let Some(current) = Self::lock_in_states(&mut tx, id, from).await? else {
            tx.rollback().await?;
            timer.record();
            return Ok(None);
        };

        let approval_number = match (&current.approval_number, &stamp.number) {
            (None, Some(allocation)) => Some(next_approval_number(&mut tx, allocation).await?),
            _ => None,
        };

        let updated = sqlx::query_as::<_, PermitRequestEntity>(
            r#"
            UPDATE permit_requests
            SET status = $2,
                approved_at = $3,
                approved_by = $4,
                rejection_reason = NULL,
                approval_number = COALESCE(approval_number, $5)
            WHERE id = $1
            RETURNING id, student_id, request_type, reason, extra_info, status, approval_number,
                      submitted_at, approved_at, approved_by, rejection_reason
            "#,
        )
        .bind(id)
        .bind(RequestStatusDb::from(stamp.status))
        .bind(stamp.approved_at)
        .bind(&stamp.approved_by)
        .bind(approval_number)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(Some((current.status, updated)))
    }

    /// Reject a request still in one of `from`, clearing approval fields.
    pub async fn reject(
        &self,
        id: i64,
        from: &[RequestStatus],
        reason: &str,
    ) -> Result<Option<(RequestStatusDb, PermitRequestEntity)>, sqlx::Error> {
        let timer = QueryTimer::new("reject_permit_request");
        let mut tx = self.pool.begin().await?;

        let Some(current) = Self::lock_in_states(&mut tx, id, from).await? else {
            tx.rollback().await?;
            timer.record();
            return Ok(None);
        };

        let updated = sqlx::query_as::<_, PermitRequestEntity>(
            r#"
            UPDATE permit_requests
            SET status = 'rejected',
                rejection_reason = $2,
                approved_at = NULL,
                approved_by = NULL
            WHERE id = $1
            RETURNING id, student_id, request_type, reason, extra_info, status, approval_number,
                      submitted_at, approved_at, approved_by, rejection_reason
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(Some((current.status, updated)))
    }

    /// Delete a request owned by `student_id` in one of `from`.
    pub async fn delete_owned(
        &self,
        id: i64,
        student_id: &str,
        from: &[RequestStatus],
    ) -> Result<Option<PermitRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("delete_owned_permit_request");
        let result = sqlx::query_as::<_, PermitRequestEntity>(
            r#"
            DELETE FROM permit_requests
            WHERE id = $1 AND student_id = $2 AND status = ANY($3)
            RETURNING id, student_id, request_type, reason, extra_info, status, approval_number,
                      submitted_at, approved_at, approved_by, rejection_reason
            "#,
        )
        .bind(id)
        .bind(student_id)
        .bind(RequestStatusDb::many(from))
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Count requests grouped by type and status.
    pub async fn count_by_type_and_status(&self) -> Result<Vec<TypeStatusCountEntity>, sqlx::Error> {
        let timer = QueryTimer::new("count_permit_requests_by_type_status");
        let result = sqlx::query_as::<_, TypeStatusCountEntity>(
            r#"
            SELECT request_type, status, COUNT(*) AS count
            FROM permit_requests
            GROUP BY request_type, status
            ORDER BY request_type, status
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Count requests grouped by student grade.
    pub async fn count_by_grade(&self) -> Result<Vec<GradeCountEntity>, sqlx::Error> {
        let timer = QueryTimer::new("count_permit_requests_by_grade");
        let result = sqlx::query_as::<_, GradeCountEntity>(
            r#"
            SELECT s.grade, COUNT(*) AS count
            FROM permit_requests r
            JOIN students s ON s.id = r.student_id
            GROUP BY s.grade
            ORDER BY s.grade
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Approved gate requests for the published roster.
    pub async fn gate_roster(&self) -> Result<Vec<GateRosterEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_gate_roster");
        let result = sqlx::query_as::<_, GateRosterEntity>(
            r#"
            SELECT r.student_id, s.name, s.grade, s.class_num, r.reason, r.extra_info
            FROM permit_requests r
            JOIN students s ON s.id = r.student_id
            WHERE r.request_type = 'gate'
              AND r.status IN ('approved', 'auto_approved')
            ORDER BY s.grade, s.class_num, s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

fn into_transition(
    row: Option<(RequestStatusDb, PermitRequestEntity)>,
) -> Option<StatusTransition> {
    row.map(|(previous, entity)| StatusTransition {
        previous: previous.into(),
        request: entity.into(),
    })
}

#[async_trait::async_trait]
impl PermitRequestStore for PermitRequestRepository {
    async fn insert(&self, new: &NewPermitRequest) -> Result<PermitRequest, StoreError> {
        with_retry("create_permit_request", || self.create(new))
            .await
            .map(Into::into)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PermitRequest>, StoreError> {
        with_retry("find_permit_request_by_id", || {
            PermitRequestRepository::find_by_id(self, id)
        })
        .await
        .map(|row| row.map(Into::into))
    }

    async fn list(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<PermitRequestWithStudent>, StoreError> {
        let status = filter.status.map(RequestStatusDb::from);
        let request_type = filter.request_type.map(RequestTypeDb::from);
        let student_id = filter.student_id.as_deref();
        with_retry("list_permit_requests", || {
            PermitRequestRepository::list(self, status, request_type, student_id)
        })
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
    }

    async fn find_due_pending(
        &self,
        request_type: RequestType,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        with_retry("find_due_pending_permit_requests", || {
            PermitRequestRepository::find_due_pending(self, request_type.into(), cutoff)
        })
        .await
    }

    async fn apply_approval(
        &self,
        id: i64,
        from: &[RequestStatus],
        stamp: &ApprovalStamp,
    ) -> Result<Option<StatusTransition>, StoreError> {
        with_retry("approve_permit_request", || self.approve(id, from, stamp))
            .await
            .map(into_transition)
    }

    async fn apply_rejection(
        &self,
        id: i64,
        from: &[RequestStatus],
        reason: &str,
    ) -> Result<Option<StatusTransition>, StoreError> {
        with_retry("reject_permit_request", || self.reject(id, from, reason))
            .await
            .map(into_transition)
    }

    async fn delete_owned(
        &self,
        id: i64,
        student_id: &str,
        from: &[RequestStatus],
    ) -> Result<Option<PermitRequest>, StoreError> {
        with_retry("delete_owned_permit_request", || {
            PermitRequestRepository::delete_owned(self, id, student_id, from)
        })
        .await
        .map(|row| row.map(Into::into))
    }

    async fn count_by_type_and_status(&self) -> Result<Vec<TypeStatusCount>, StoreError> {
        with_retry("count_permit_requests_by_type_status", || {
            PermitRequestRepository::count_by_type_and_status(self)
        })
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
    }

    async fn count_by_grade(&self) -> Result<Vec<GradeCount>, StoreError> {
        with_retry("count_permit_requests_by_grade", || {
            PermitRequestRepository::count_by_grade(self)
        })
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
    }

    async fn gate_roster(&self) -> Result<Vec<GateRosterEntry>, StoreError> {
        with_retry("list_gate_roster", || PermitRequestRepository::gate_roster(self))
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
    }
}
