//! Classification of database errors and the retry-once policy.

use std::future::Future;

use domain::services::StoreError;

use crate::metrics::record_retry;

/// Unique constraint guarding one live request per student and type.
pub const STUDENT_TYPE_CONSTRAINT: &str = "permit_requests_student_type_key";

/// Maps a sqlx error onto the domain's storage error kinds.
pub fn map_store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Transient(err.to_string()),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            match code.as_str() {
                "23505" if db_err.constraint() == Some(STUDENT_TYPE_CONSTRAINT) => {
                    StoreError::Duplicate
                }
                "23503" => StoreError::ForeignKey,
                // Class 08 (connection exception) and admin shutdown.
                c if c.starts_with("08") || c == "57P01" => StoreError::Transient(err.to_string()),
                _ => StoreError::Database(err.to_string()),
            }
        }
        _ => StoreError::Database(err.to_string()),
    }
}

/// Runs `op`, retrying exactly once when the first attempt fails with a
/// transient error. The pool health-checks the connection used for the
/// second attempt.
pub async fn with_retry<T, F, Fut>(operation: &'static str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match op().await.map_err(map_store_error) {
        Err(err) if err.is_transient() => {
            tracing::warn!(operation, error = %err, "Transient database error, retrying once");
            record_retry(operation);
            op().await.map_err(map_store_error)
        }
        other => other,
    }
}
