//! Permit request entities (database row mappings).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::{
    GateRosterEntry, GradeCount, PermitRequest, PermitRequestWithStudent, RequestStatus,
    RequestType, TypeStatusCount,
};

/// Database enum for request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "permit_request_type", rename_all = "snake_case")]
pub enum RequestTypeDb {
    Phone,
    Tablet,
    Gate,
}

impl From<RequestType> for RequestTypeDb {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::Phone => RequestTypeDb::Phone,
            RequestType::Tablet => RequestTypeDb::Tablet,
            RequestType::Gate => RequestTypeDb::Gate,
        }
    }
}

impl From<RequestTypeDb> for RequestType {
    fn from(value: RequestTypeDb) -> Self {
        match value {
            RequestTypeDb::Phone => RequestType::Phone,
            RequestTypeDb::Tablet => RequestType::Tablet,
            RequestTypeDb::Gate => RequestType::Gate,
        }
    }
}

/// Database enum for request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "permit_request_status", rename_all = "snake_case")]
pub enum RequestStatusDb {
    Pending,
    AutoApproved,
    Approved,
    Rejected,
}

// Needed to bind `Vec<RequestStatusDb>` to `status = ANY($n)`.
impl sqlx::postgres::PgHasArrayType for RequestStatusDb {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_permit_request_status")
    }
}

impl RequestStatusDb {
    pub fn many(statuses: &[RequestStatus]) -> Vec<Self> {
        statuses.iter().copied().map(Self::from).collect()
    }
}

impl From<RequestStatus> for RequestStatusDb {
    fn from(value: RequestStatus) -> Self {
        match value {
            RequestStatus::Pending => RequestStatusDb::Pending,
            RequestStatus::AutoApproved => RequestStatusDb::AutoApproved,
            RequestStatus::Approved => RequestStatusDb::Approved,
            RequestStatus::Rejected => RequestStatusDb::Rejected,
        }
    }
}

impl From<RequestStatusDb> for RequestStatus {
    fn from(value: RequestStatusDb) -> Self {
        match value {
            RequestStatusDb::Pending => RequestStatus::Pending,
            RequestStatusDb::AutoApproved => RequestStatus::AutoApproved,
            RequestStatusDb::Approved => RequestStatus::Approved,
            RequestStatusDb::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Database row mapping for the permit_requests table.
#[derive(Debug, Clone, FromRow)]
pub struct PermitRequestEntity {
    pub id: i64,
    pub student_id: String,
    pub request_type: RequestTypeDb,
    pub reason: String,
    pub extra_info: Option<String>,
    pub status: RequestStatusDb,
    pub approval_number: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

impl From<PermitRequestEntity> for PermitRequest {
    fn from(entity: PermitRequestEntity) -> Self {
        Self {
            id: entity.id,
            student_id: entity.student_id,
            request_type: entity.request_type.into(),
            reason: entity.reason,
            extra_info: entity.extra_info,
            status: entity.status.into(),
            approval_number: entity.approval_number,
            submitted_at: entity.submitted_at,
            approved_at: entity.approved_at,
            approved_by: entity.approved_by,
            rejection_reason: entity.rejection_reason,
        }
    }
}

/// Permit request joined with student columns.
#[derive(Debug, Clone, FromRow)]
pub struct PermitRequestWithStudentEntity {
    #[sqlx(flatten)]
    pub request: PermitRequestEntity,
    pub student_name: String,
    pub grade: i32,
    pub class_num: i32,
}

impl From<PermitRequestWithStudentEntity> for PermitRequestWithStudent {
    fn from(entity: PermitRequestWithStudentEntity) -> Self {
        Self {
            request: entity.request.into(),
            student_name: entity.student_name,
            grade: entity.grade,
            class_num: entity.class_num,
        }
    }
}

/// Row of the approved gate roster query.
#[derive(Debug, Clone, FromRow)]
pub struct GateRosterEntity {
    pub student_id: String,
    pub name: String,
    pub grade: i32,
    pub class_num: i32,
    pub reason: String,
    pub extra_info: Option<String>,
}

impl From<GateRosterEntity> for GateRosterEntry {
    fn from(entity: GateRosterEntity) -> Self {
        Self {
            student_id: entity.student_id,
            name: entity.name,
            grade: entity.grade,
            class_num: entity.class_num,
            reason: entity.reason,
            extra_info: entity.extra_info,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TypeStatusCountEntity {
    pub request_type: RequestTypeDb,
    pub status: RequestStatusDb,
    pub count: i64,
}

impl From<TypeStatusCountEntity> for TypeStatusCount {
    fn from(entity: TypeStatusCountEntity) -> Self {
        Self {
            request_type: entity.request_type.into(),
            status: entity.status.into(),
            count: entity.count,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GradeCountEntity {
    pub grade: i32,
    pub count: i64,
}

impl From<GradeCountEntity> for GradeCount {
    fn from(entity: GradeCountEntity) -> Self {
        Self {
            grade: entity.grade,
            count: entity.count,
        }
    }
}
