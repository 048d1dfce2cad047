//! Shared utilities and common types for the permit desk backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Field validation for roster and request data
//! - Lenient parsing of school calendar dates

pub mod validation;
