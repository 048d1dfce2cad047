//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod permit_request;
pub mod setting;
pub mod student;

pub use permit_request::{
    GateRosterEntity, GradeCountEntity, PermitRequestEntity, PermitRequestWithStudentEntity,
    RequestStatusDb, RequestTypeDb, TypeStatusCountEntity,
};
pub use setting::SettingEntity;
pub use student::StudentEntity;
