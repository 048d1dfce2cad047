//! HTTP route handlers.

pub mod admin_policies;
pub mod admin_requests;
pub mod admin_roster;
pub mod admin_settings;
pub mod admin_students;
pub mod health;
pub mod permit_requests;
