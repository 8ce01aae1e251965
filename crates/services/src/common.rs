/// Storage-level failures, independent of the domain that hit them
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("'{0}' does not exist")]
    NotFound(String),
    #[error("Cannot add this resource as it already exists")]
    AlreadyExists,
    #[error("Referenced entity does not exist: {0}")]
    ForeignKeyViolation(String),
    #[error("Data validation failed: {0}")]
    ValidationFailed(String),
    #[error("Transaction conflict, please retry")]
    TransactionConflict,
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Database connection pool error: {0}")]
    PoolError(#[source] anyhow::Error),
    #[error("Database operation error: {0}")]
    DatabaseError(#[source] anyhow::Error),
    #[error("Data conversion error: {0}")]
    DataConversionError(#[source] anyhow::Error),
}

impl RepositoryError {
    /// Failures worth repeating the whole operation for
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::TransactionConflict
                | RepositoryError::ConnectionFailed(_)
                | RepositoryError::PoolError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(RepositoryError::TransactionConflict.is_transient());
        assert!(RepositoryError::ConnectionFailed("reset".into()).is_transient());
        assert!(!RepositoryError::AlreadyExists.is_transient());
        assert!(!RepositoryError::NotFound("thread_x".into()).is_transient());
    }
}
