//! Mapping of sqlx errors onto [`StoreError`].

use studio_core::store::StoreError;

/// `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";
/// `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";
/// `query_canceled`, raised when `statement_timeout` fires
const QUERY_CANCELED: &str = "57014";

/// Classifies a sqlx error.
///
/// Serialization failures, deadlocks and unique violations become
/// [`StoreError::Conflict`] so the whole transaction can be retried; a retry
/// re-reads the row that won the race. Cancelled statements and pool
/// exhaustion become [`StoreError::Timeout`].
pub fn classify(context: &str, err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION) => {
                tracing::debug!(context, error = %db_err, "Write conflict");
                StoreError::Conflict(format!("{context}: {db_err}"))
            }
            Some(QUERY_CANCELED) => StoreError::Timeout(format!("{context}: {db_err}")),
            _ => StoreError::Database(format!("{context}: {db_err}")),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout(format!("{context}: pool timed out")),
        other => StoreError::Database(format!("{context}: {other}")),
    }
}

/// Shorthand for `.map_err(db_err("context"))`.
pub fn db_err(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| classify(context, &e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_a_timeout() {
        let err = classify("begin", &sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[test]
    fn row_not_found_is_a_database_error() {
        let err = classify("load session", &sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(msg) if msg.starts_with("load session")));
    }
}
