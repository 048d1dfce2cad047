//! Approval-number issuing.
//!
//! Numbers look like `DS-GATE-2025-0007`: organization prefix, type code,
//! the year of approval in the school's timezone, and a sequence scoped to
//! (type, year). The sequence itself comes from a counter kept by storage
//! and advanced inside the approving transaction.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};

use crate::models::permit_request::RequestType;

/// Default organization prefix.
pub const DEFAULT_PREFIX: &str = "DS";

/// Which counter to draw from and how to render the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberAllocation {
    pub prefix: String,
    pub request_type: RequestType,
    pub year: i32,
}

impl NumberAllocation {
    pub fn render(&self, sequence: i64) -> String {
        format!(
            "{}-{}-{}-{:04}",
            self.prefix,
            self.request_type.type_code(),
            self.year,
            sequence
        )
    }
}

/// Decides when and how a request gets a number.
#[derive(Debug, Clone)]
pub struct ApprovalNumberIssuer {
    prefix: String,
    school_offset: FixedOffset,
}

impl ApprovalNumberIssuer {
    pub fn new(prefix: impl Into<String>, school_offset: FixedOffset) -> Self {
        Self {
            prefix: prefix.into(),
            school_offset,
        }
    }

    /// Allocation for a request of `request_type` approved at `approved_at`,
    /// or `None` for types that are never numbered.
    pub fn allocation_for(
        &self,
        request_type: RequestType,
        approved_at: DateTime<Utc>,
    ) -> Option<NumberAllocation> {
        if !request_type.issues_approval_number() {
            return None;
        }
        Some(NumberAllocation {
            prefix: self.prefix.clone(),
            request_type,
            year: approved_at.with_timezone(&self.school_offset).year(),
        })
    }
}

impl Default for ApprovalNumberIssuer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, Utc.fix())
    }
}
