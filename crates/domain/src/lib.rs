//! Domain layer for the permit desk.
//!
//! This crate contains:
//! - Domain models (Student, PermitRequest, GateSchedule, settings)
//! - The approval workflow engine and its storage/notifier seams
//! - Roster import parsing

pub mod models;
pub mod services;
