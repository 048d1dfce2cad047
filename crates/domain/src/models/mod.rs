//! Domain models for the permit desk.

pub mod approval_settings;
pub mod gate_schedule;
pub mod permit_document;
pub mod permit_request;
pub mod roster;
pub mod statistics;
pub mod student;

pub use approval_settings::{
    parse_academic_year, parse_academic_year_start, AcademicCalendar, AcademicCalendarView,
    ApprovalMode, ApprovalPolicy, ApprovalSettings, SettingKey, UpdateCalendarRequest,
    UpdatePolicyRequest,
};
pub use gate_schedule::{DismissalSlot, GateSchedule, Weekday};
pub use permit_document::PermitDocumentContext;
pub use permit_request::{
    ApprovalStamp, ListPermitRequestsResponse, NewPermitRequest, ParseEnumError, PermitRequest,
    PermitRequestWithStudent, RejectPermitRequestRequest, RequestFilter, RequestStatus,
    RequestType, StatusTransition, SubmitPermitRequestRequest, SubmitPermitRequestResponse,
    TransitionResponse,
};
pub use roster::{GateRosterEntry, GateRosterItem, RosterRow};
pub use statistics::{GradeCount, PermitStatistics, StatusCounts, TypeStatusCount};
pub use student::Student;
