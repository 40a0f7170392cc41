use sequent::ValidationError;
use thiserror::Error;

/// Represents all the ways a method can fail within Sequent Postgres.
///
/// Caller cancellation is not an error kind: every operation is a future, and
/// dropping it rolls back the in-flight transaction and closes the cursor.
#[derive(Error, Debug)]
pub enum Error {
    /// An event or a query is structurally invalid. Not retriable.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The append batch exceeds the configured maximum. Not retriable.
    #[error("append batch exceeds the configured maximum of {max} events (got {actual})")]
    BatchTooLarge { max: usize, actual: usize },
    /// The append condition matched an event persisted after the position observed by
    /// the caller's decision. The event store's state has changed, potentially
    /// affecting the decision; re-project and retry.
    #[error("append condition matched events appended after the observed position")]
    Concurrency,
    /// The append could not acquire the log tail lock within the configured budget.
    /// Retriable.
    #[error("timed out acquiring the event log tail lock")]
    LockTimeout,
    /// A read or scan exceeded the configured time budget. Retriable.
    #[error("read exceeded the configured time budget")]
    Timeout,
    /// A stored row could not be decoded into an event.
    #[error("unable to decode a stored event: {0}")]
    Decode(#[source] serde_json::Error),
    /// Error returned from the database.
    #[error(transparent)]
    Database(sqlx::Error),
}

impl Error {
    /// Returns `true` for failures that a retry of the whole
    /// read-project-decide-append cycle can resolve. `Database` errors are reported
    /// as not retriable here; callers may still inspect the underlying error for
    /// transient conditions.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Concurrency | Error::LockTimeout | Error::Timeout
        )
    }
}

/// SQLSTATE codes surfaced as dedicated error kinds.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";
const SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref description) = err {
            match description.code().as_deref() {
                Some(LOCK_NOT_AVAILABLE) => return Error::LockTimeout,
                Some(QUERY_CANCELED) => return Error::Timeout,
                Some(SERIALIZATION_FAILURE) => return Error::Concurrency,
                _ => {}
            }
        }
        Error::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_and_timeouts_are_retriable() {
        assert!(Error::Concurrency.is_retriable());
        assert!(Error::LockTimeout.is_retriable());
        assert!(Error::Timeout.is_retriable());
        assert!(!Error::Validation(ValidationError::NoTags).is_retriable());
        assert!(!Error::BatchTooLarge { max: 1, actual: 2 }.is_retriable());
        assert!(!Error::Database(sqlx::Error::PoolClosed).is_retriable());
    }
}
