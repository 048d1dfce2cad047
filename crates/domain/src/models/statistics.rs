//! Read-only projections over request state for dashboards.

use serde::Serialize;

use super::permit_request::{RequestStatus, RequestType};

/// Count of requests per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusCounts {
    pub pending: i64,
    pub auto_approved: i64,
    pub approved: i64,
    pub rejected: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: RequestStatus, count: i64) {
        match status {
            RequestStatus::Pending => self.pending += count,
            RequestStatus::AutoApproved => self.auto_approved += count,
            RequestStatus::Approved => self.approved += count,
            RequestStatus::Rejected => self.rejected += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.auto_approved + self.approved + self.rejected
    }
}

/// One row of the (type, status) breakdown as returned by storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TypeStatusCount {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub count: i64,
}

/// Requests per student grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct GradeCount {
    pub grade: i32,
    pub count: i64,
}

/// Per-type status breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TypeBreakdown {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub total: i64,
}

/// Dashboard statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PermitStatistics {
    pub total: i64,
    pub by_status: StatusCounts,
    pub by_type: Vec<TypeBreakdown>,
    pub by_grade: Vec<GradeCount>,
}

impl PermitStatistics {
    /// Folds raw storage counts into the dashboard shape. Every request
    /// type appears in `by_type`, with zeros when it has no requests.
    pub fn from_counts(rows: &[TypeStatusCount], mut by_grade: Vec<GradeCount>) -> Self {
        let mut by_status = StatusCounts::default();
        let by_type = RequestType::ALL
            .iter()
            .map(|&request_type| {
                let mut counts = StatusCounts::default();
                for row in rows.iter().filter(|r| r.request_type == request_type) {
                    counts.add(row.status, row.count);
                    by_status.add(row.status, row.count);
                }
                TypeBreakdown {
                    request_type,
                    counts,
                    total: counts.total(),
                }
            })
            .collect();

        by_grade.sort_by_key(|g| g.grade);

        Self {
            total: by_status.total(),
            by_status,
            by_type,
            by_grade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counts() {
        let rows = vec![
            TypeStatusCount {
                request_type: RequestType::Phone,
                status: RequestStatus::Pending,
                count: 2,
            },
            TypeStatusCount {
                request_type: RequestType::Gate,
                status: RequestStatus::AutoApproved,
                count: 3,
            },
            TypeStatusCount {
                request_type: RequestType::Phone,
                status: RequestStatus::Rejected,
                count: 1,
            },
        ];
        let grades = vec![
            GradeCount { grade: 3, count: 4 },
            GradeCount { grade: 1, count: 2 },
        ];

        let stats = PermitStatistics::from_counts(&rows, grades);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.by_status.pending, 2);
        assert_eq!(stats.by_status.auto_approved, 3);
        assert_eq!(stats.by_status.rejected, 1);
        assert_eq!(stats.by_type.len(), 3);
        assert_eq!(stats.by_type[0].total, 3);
        assert_eq!(stats.by_type[1].total, 0);
        assert_eq!(stats.by_grade[0].grade, 1);
    }

    #[test]
    fn test_serialized_shape() {
        let stats = PermitStatistics::from_counts(&[], vec![]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total"], 0);
        assert_eq!(json["by_type"][2]["type"], "gate");
        assert_eq!(json["by_type"][2]["pending"], 0);
    }
}
