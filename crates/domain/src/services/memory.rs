//! In-memory implementation of the storage traits.
//!
//! Mirrors the guarantees of the PostgreSQL repositories (unique
//! student/type pair, guarded status changes, per-year number counters)
//! so the workflow can run without a database in tests. Compiled only for
//! tests and the `test-util` feature.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::store::{PermitRequestStore, RemovedRows, SettingsStore, StoreError, StudentStore};
use crate::models::{
    ApprovalStamp, GateRosterEntry, GradeCount, NewPermitRequest, PermitRequest,
    PermitRequestWithStudent, RequestFilter, RequestStatus, RequestType, StatusTransition,
    Student, TypeStatusCount,
};
use crate::services::approval_number::NumberAllocation;

#[derive(Debug, Default)]
struct MemoryState {
    students: HashMap<String, Student>,
    requests: BTreeMap<i64, PermitRequest>,
    settings: HashMap<String, String>,
    sequences: HashMap<(RequestType, i32), i64>,
    next_id: i64,
    unavailable: bool,
}

impl MemoryState {
    fn next_number(&mut self, allocation: &NumberAllocation) -> String {
        let seq = self
            .sequences
            .entry((allocation.request_type, allocation.year))
            .or_insert(0);
        *seq += 1;
        allocation.render(*seq)
    }

    fn with_student(&self, request: &PermitRequest) -> Option<PermitRequestWithStudent> {
        let student = self.students.get(&request.student_id)?;
        Some(PermitRequestWithStudent {
            request: request.clone(),
            student_name: student.name.clone(),
            grade: student.grade,
            class_num: student.class_num,
        })
    }
}

/// Shared in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a transient error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::Database("memory store poisoned".to_string()))?;
        if state.unavailable {
            return Err(StoreError::Transient("memory store unavailable".to_string()));
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl PermitRequestStore for MemoryStore {
    async fn insert(&self, new: &NewPermitRequest) -> Result<PermitRequest, StoreError> {
        let mut state = self.lock()?;

        if !state.students.contains_key(&new.student_id) {
            return Err(StoreError::ForeignKey);
        }
        if state
            .requests
            .values()
            .any(|r| r.student_id == new.student_id && r.request_type == new.request_type)
        {
            return Err(StoreError::Duplicate);
        }

        state.next_id += 1;
        let id = state.next_id;

        let mut request = PermitRequest {
            id,
            student_id: new.student_id.clone(),
            request_type: new.request_type,
            reason: new.reason.clone(),
            extra_info: new.extra_info.clone(),
            status: RequestStatus::Pending,
            approval_number: None,
            submitted_at: new.submitted_at,
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
        };

        if let Some(stamp) = &new.approval {
            request.status = stamp.status;
            request.approved_at = Some(stamp.approved_at);
            request.approved_by = Some(stamp.approved_by.clone());
            if let Some(allocation) = &stamp.number {
                request.approval_number = Some(state.next_number(allocation));
            }
        }

        state.requests.insert(id, request.clone());
        Ok(request)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PermitRequest>, StoreError> {
        Ok(self.lock()?.requests.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<PermitRequestWithStudent>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<PermitRequestWithStudent> = state
            .requests
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.request_type.map_or(true, |t| r.request_type == t))
            .filter(|r| {
                filter
                    .student_id
                    .as_deref()
                    .map_or(true, |s| r.student_id == s)
            })
            .filter_map(|r| state.with_student(r))
            .collect();
        rows.sort_by(|a, b| {
            b.request
                .submitted_at
                .cmp(&a.request.submitted_at)
                .then(b.request.id.cmp(&a.request.id))
        });
        Ok(rows)
    }

    async fn find_due_pending(
        &self,
        request_type: RequestType,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let state = self.lock()?;
        let mut due: Vec<&PermitRequest> = state
            .requests
            .values()
            .filter(|r| {
                r.request_type == request_type
                    && r.status == RequestStatus::Pending
                    && r.submitted_at <= cutoff
            })
            .collect();
        due.sort_by_key(|r| (r.submitted_at, r.id));
        Ok(due.into_iter().map(|r| r.id).collect())
    }

    async fn apply_approval(
        &self,
        id: i64,
        from: &[RequestStatus],
        stamp: &ApprovalStamp,
    ) -> Result<Option<StatusTransition>, StoreError> {
        let mut state = self.lock()?;

        let (previous, needs_number) = match state.requests.get(&id) {
            Some(r) if from.contains(&r.status) => (r.status, r.approval_number.is_none()),
            _ => return Ok(None),
        };

        let number = match (&stamp.number, needs_number) {
            (Some(allocation), true) => Some(state.next_number(allocation)),
            _ => None,
        };

        let Some(request) = state.requests.get_mut(&id) else {
            return Ok(None);
        };
        request.status = stamp.status;
        request.approved_at = Some(stamp.approved_at);
        request.approved_by = Some(stamp.approved_by.clone());
        request.rejection_reason = None;
        if number.is_some() {
            request.approval_number = number;
        }

        Ok(Some(StatusTransition {
            previous,
            request: request.clone(),
        }))
    }

    async fn apply_rejection(
        &self,
        id: i64,
        from: &[RequestStatus],
        reason: &str,
    ) -> Result<Option<StatusTransition>, StoreError> {
        let mut state = self.lock()?;
        let Some(request) = state.requests.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&request.status) {
            return Ok(None);
        }

        let previous = request.status;
        request.status = RequestStatus::Rejected;
        request.rejection_reason = Some(reason.to_string());
        request.approved_at = None;
        request.approved_by = None;

        Ok(Some(StatusTransition {
            previous,
            request: request.clone(),
        }))
    }

    async fn delete_owned(
        &self,
        id: i64,
        student_id: &str,
        from: &[RequestStatus],
    ) -> Result<Option<PermitRequest>, StoreError> {
        let mut state = self.lock()?;
        let owned = state
            .requests
            .get(&id)
            .is_some_and(|r| r.student_id == student_id && from.contains(&r.status));
        if !owned {
            return Ok(None);
        }
        Ok(state.requests.remove(&id))
    }

    async fn count_by_type_and_status(&self) -> Result<Vec<TypeStatusCount>, StoreError> {
        let state = self.lock()?;
        let mut counts: BTreeMap<(RequestType, RequestStatus), i64> = BTreeMap::new();
        for r in state.requests.values() {
            *counts.entry((r.request_type, r.status)).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((request_type, status), count)| TypeStatusCount {
                request_type,
                status,
                count,
            })
            .collect())
    }

    async fn count_by_grade(&self) -> Result<Vec<GradeCount>, StoreError> {
        let state = self.lock()?;
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for r in state.requests.values() {
            if let Some(student) = state.students.get(&r.student_id) {
                *counts.entry(student.grade).or_insert(0) += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(grade, count)| GradeCount { grade, count })
            .collect())
    }

    async fn gate_roster(&self) -> Result<Vec<GateRosterEntry>, StoreError> {
        let state = self.lock()?;
        let mut entries: Vec<(i32, i32, GateRosterEntry)> = state
            .requests
            .values()
            .filter(|r| r.is_approved_gate())
            .filter_map(|r| {
                let s = state.students.get(&r.student_id)?;
                Some((
                    s.grade,
                    s.class_num,
                    GateRosterEntry {
                        student_id: r.student_id.clone(),
                        name: s.name.clone(),
                        grade: s.grade,
                        class_num: s.class_num,
                        reason: r.reason.clone(),
                        extra_info: r.extra_info.clone(),
                    },
                ))
            })
            .collect();
        entries.sort_by(|a, b| (a.0, a.1, &a.2.name).cmp(&(b.0, b.1, &b.2.name)));
        Ok(entries.into_iter().map(|(_, _, e)| e).collect())
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemoryStore {
    async fn load_all(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.lock()?.settings.clone())
    }

    async fn save(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for (key, value) in entries {
            state.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StudentStore for MemoryStore {
    async fn find(&self, id: &str) -> Result<Option<Student>, StoreError> {
        Ok(self.lock()?.students.get(id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Student>, StoreError> {
        let state = self.lock()?;
        let mut students: Vec<Student> = state.students.values().cloned().collect();
        students.sort_by(|a, b| {
            (a.grade, a.class_num, &a.name).cmp(&(b.grade, b.class_num, &b.name))
        });
        Ok(students)
    }

    async fn upsert_many(&self, students: &[Student]) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        for student in students {
            state.students.insert(student.id.clone(), student.clone());
        }
        Ok(students.len())
    }

    async fn remove(&self, id: &str) -> Result<RemovedRows, StoreError> {
        let mut state = self.lock()?;
        let mut removed = RemovedRows::default();
        state.requests.retain(|_, r| {
            if r.student_id != id {
                return true;
            }
            removed.requests += 1;
            if r.is_approved_gate() {
                removed.approved_gate += 1;
            }
            false
        });
        if state.students.remove(id).is_some() {
            removed.students = 1;
        }
        Ok(removed)
    }

    async fn remove_all(&self) -> Result<RemovedRows, StoreError> {
        let mut state = self.lock()?;
        let removed = RemovedRows {
            students: state.students.len(),
            requests: state.requests.len(),
            approved_gate: state.requests.values().filter(|r| r.is_approved_gate()).count(),
        };
        state.requests.clear();
        state.students.clear();
        Ok(removed)
    }
}
