//! Custom Axum extractors.

pub mod identity;

pub use identity::{AdminIdentity, StudentIdentity, ADMIN_NAME_HEADER, STUDENT_ID_HEADER};
