//! Data exposed to the permit document generator.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use super::gate_schedule::describe_extra_info;
use super::permit_request::{PermitRequest, RequestType};
use super::student::Student;

/// Everything needed to print a permit for an approved request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PermitDocumentContext {
    pub request_id: i64,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub type_name: String,
    pub student_id: String,
    pub student_name: String,
    pub grade: i32,
    pub class_num: i32,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_number: Option<String>,
    pub approved_at: DateTime<Utc>,
    /// Approval date in the school's calendar, e.g. `2025. 3. 4.`.
    pub approved_on_text: String,
    /// Gate schedule summary, or the free-form details for other types.
    pub schedule_text: String,
    /// Validity period for gate permits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_text: Option<String>,
}

impl PermitDocumentContext {
    /// Builds the context. Returns `None` unless the request is approved.
    pub fn build(
        request: &PermitRequest,
        student: &Student,
        period_text: &str,
        school_offset: FixedOffset,
    ) -> Option<Self> {
        if !request.status.is_approved() {
            return None;
        }
        let approved_at = request.approved_at?;
        let local = approved_at.with_timezone(&school_offset);

        Some(Self {
            request_id: request.id,
            request_type: request.request_type,
            type_name: request.request_type.display_name().to_string(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            grade: student.grade,
            class_num: student.class_num,
            reason: request.reason.clone(),
            approval_number: request.approval_number.clone(),
            approved_at,
            approved_on_text: local.format("%Y. %-m. %-d.").to_string(),
            schedule_text: describe_extra_info(request.extra_info.as_deref()),
            period_text: (request.request_type == RequestType::Gate)
                .then(|| period_text.to_string()),
        })
    }
}
