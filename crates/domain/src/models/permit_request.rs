//! Permit request domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::gate_schedule::GateSchedule;
use crate::services::approval_number::NumberAllocation;

/// Kind of permit a parent can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Phone,
    Tablet,
    Gate,
}

impl RequestType {
    /// Every supported request type, in display order.
    pub const ALL: [RequestType; 3] = [RequestType::Phone, RequestType::Tablet, RequestType::Gate];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Phone => "phone",
            RequestType::Tablet => "tablet",
            RequestType::Gate => "gate",
        }
    }

    /// Upper-case code embedded in approval numbers.
    pub fn type_code(&self) -> &'static str {
        match self {
            RequestType::Phone => "PHONE",
            RequestType::Tablet => "TABLET",
            RequestType::Gate => "GATE",
        }
    }

    /// Name shown to parents and staff.
    pub fn display_name(&self) -> &'static str {
        match self {
            RequestType::Phone => "휴대전화",
            RequestType::Tablet => "태블릿PC",
            RequestType::Gate => "정문출입",
        }
    }

    /// Only gate permits carry an approval number.
    pub fn issues_approval_number(&self) -> bool {
        matches!(self, RequestType::Gate)
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown request type or status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl std::str::FromStr for RequestType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phone" => Ok(RequestType::Phone),
            "tablet" => Ok(RequestType::Tablet),
            "gate" => Ok(RequestType::Gate),
            _ => Err(ParseEnumError {
                kind: "request type",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a permit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    AutoApproved,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::AutoApproved,
        RequestStatus::Approved,
        RequestStatus::Rejected,
    ];

    /// States from which the owning student may cancel.
    pub const CANCELLABLE: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::AutoApproved,
    ];

    /// States an administrator may approve from.
    pub const APPROVABLE: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::AutoApproved,
        RequestStatus::Rejected,
    ];

    /// States an administrator may reject from.
    pub const REJECTABLE: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::AutoApproved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::AutoApproved => "auto_approved",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "승인 대기",
            RequestStatus::AutoApproved => "자동 발급",
            RequestStatus::Approved => "승인 완료",
            RequestStatus::Rejected => "반려",
        }
    }

    /// True for both manual and automatic approval.
    pub fn is_approved(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::AutoApproved)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "auto_approved" => Ok(RequestStatus::AutoApproved),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(ParseEnumError {
                kind: "request status",
                value: s.to_string(),
            }),
        }
    }
}

/// A stored permit request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PermitRequest {
    pub id: i64,
    pub student_id: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_number: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl PermitRequest {
    /// True when this request currently holds an approved gate permit.
    pub fn is_approved_gate(&self) -> bool {
        self.request_type == RequestType::Gate && self.status.is_approved()
    }

    /// Parsed gate schedule, if this is a gate request with a structured payload.
    pub fn gate_schedule(&self) -> Option<GateSchedule> {
        if self.request_type != RequestType::Gate {
            return None;
        }
        self.extra_info.as_deref().and_then(GateSchedule::parse)
    }
}

/// A permit request joined with the owning student's roster data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PermitRequestWithStudent {
    #[serde(flatten)]
    pub request: PermitRequest,
    pub student_name: String,
    pub grade: i32,
    pub class_num: i32,
}

/// Approval fields written together when a request enters an approved state.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalStamp {
    pub status: RequestStatus,
    pub approved_at: DateTime<Utc>,
    pub approved_by: String,
    /// Present when the request type is numbered. The store assigns a
    /// number only if the request does not already hold one.
    pub number: Option<NumberAllocation>,
}

/// A request about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPermitRequest {
    pub student_id: String,
    pub request_type: RequestType,
    pub reason: String,
    pub extra_info: Option<String>,
    pub submitted_at: DateTime<Utc>,
    /// `None` inserts the request as pending.
    pub approval: Option<ApprovalStamp>,
}

/// Result of a guarded status change: the state before and the row after.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub previous: RequestStatus,
    pub request: PermitRequest,
}

/// Filter for listing requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RequestFilter {
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default, rename = "type")]
    pub request_type: Option<RequestType>,
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Request body for submitting a permit request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct SubmitPermitRequestRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,

    #[validate(length(min = 1, max = 1000, message = "Reason must be 1-1000 characters"))]
    pub reason: String,

    /// Required for gate requests.
    #[serde(default)]
    pub gate_schedule: Option<GateSchedule>,

    /// Free-form details for phone and tablet requests.
    #[serde(default)]
    #[validate(length(max = 2000, message = "Extra info must be at most 2000 characters"))]
    pub extra_info: Option<String>,
}

impl SubmitPermitRequestRequest {
    /// The stored details: the serialized schedule for gate requests, the
    /// trimmed free text otherwise. Gate requests need at least one
    /// morning day or dismissal slot.
    pub fn stored_extra_info(&self) -> Result<Option<String>, String> {
        match self.request_type {
            RequestType::Gate => match &self.gate_schedule {
                Some(schedule) if !schedule.is_empty() => Ok(Some(schedule.to_extra_info())),
                _ => Err("Gate requests need at least one morning day or dismissal slot".to_string()),
            },
            _ => Ok(self
                .extra_info
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)),
        }
    }
}

/// Response after submitting a permit request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmitPermitRequestResponse {
    pub request: PermitRequest,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_notice: Option<String>,
}

/// Request body for rejecting a request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct RejectPermitRequestRequest {
    #[validate(length(min = 1, max = 1000, message = "Rejection reason must be 1-1000 characters"))]
    pub reason: String,
}

/// Response after an administrative status change or cancellation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TransitionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<PermitRequest>,
    pub changed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_notice: Option<String>,
}

/// Response for listing requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListPermitRequestsResponse<T> {
    pub data: Vec<T>,
    pub total: usize,
}
