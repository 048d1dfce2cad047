//! Repository implementations for database operations.

pub mod permit_request;
pub mod setting;
pub mod student;

pub use permit_request::PermitRequestRepository;
pub use setting::SettingRepository;
pub use student::StudentRepository;
