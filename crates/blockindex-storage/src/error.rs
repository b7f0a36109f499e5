//! Mapping from `sqlx::Error` to the store's error taxonomy.

use blockindex_core::StorageError;
use sqlx::postgres::PgDatabaseError;

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

/// Classify a driver error.
pub fn classify(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::Unavailable(e.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StorageError::Unavailable(e.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned());
            let message = db.message().to_owned();
            let detail = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.detail())
                .map(str::to_owned);
            classify_database(code.as_deref(), &message, detail.as_deref())
        }
        other => StorageError::Query(other.to_string()),
    }
}

fn classify_database(code: Option<&str>, message: &str, detail: Option<&str>) -> StorageError {
    match code {
        Some(UNIQUE_VIOLATION) => StorageError::Constraint(message.to_owned()),
        Some(CHECK_VIOLATION) if message.contains("no partition") => StorageError::NoPartition {
            number: detail.and_then(partition_key).unwrap_or_default(),
        },
        Some(CHECK_VIOLATION) => StorageError::Constraint(message.to_owned()),
        _ => StorageError::Query(message.to_owned()),
    }
}

/// Pull the key out of `Partition key of the failing row contains (number) = (2000000).`
fn partition_key(detail: &str) -> Option<u64> {
    let start = detail.rfind("= (")? + 3;
    let rest = &detail[start..];
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_constraint() {
        let err = classify_database(
            Some("23505"),
            "duplicate key value violates unique constraint \"blocks_p0_pkey\"",
            None,
        );
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn missing_partition_carries_number() {
        let err = classify_database(
            Some("23514"),
            "no partition of relation \"blocks\" found for row",
            Some("Partition key of the failing row contains (number) = (2000000)."),
        );
        assert!(matches!(err, StorageError::NoPartition { number: 2_000_000 }));
    }

    #[test]
    fn other_check_violation_is_constraint() {
        let err = classify_database(
            Some("23514"),
            "new row for relation \"blocks_p0\" violates check constraint \"blocks_number_positive\"",
            None,
        );
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn pool_timeout_is_unavailable() {
        assert!(matches!(
            classify(sqlx::Error::PoolTimedOut),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            classify(sqlx::Error::RowNotFound),
            StorageError::Query(_)
        ));
    }
}
