//! Persistence layer for the permit desk.
//!
//! This crate contains:
//! - Database connection management
//! - SQL migrations
//! - Entity definitions (database row mappings)
//! - Repositories implementing the domain storage traits

pub mod db;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;
