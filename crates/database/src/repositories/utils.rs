use services::common::RepositoryError;
use services::conversations::models::{GuestSessionId, Owner, UserId};
use tokio_postgres::{error::SqlState, Row};
use uuid::Uuid;

/// Classify a driver error so callers can decide whether to retry
pub fn map_db_error(err: tokio_postgres::Error) -> RepositoryError {
    if err.is_closed() {
        return RepositoryError::ConnectionFailed("Connection closed".to_string());
    }

    let Some(db_err) = err.as_db_error() else {
        return RepositoryError::DatabaseError(err.into());
    };
    let message = db_err.message().to_string();

    match db_err.code() {
        &SqlState::UNIQUE_VIOLATION => RepositoryError::AlreadyExists,
        &SqlState::FOREIGN_KEY_VIOLATION => RepositoryError::ForeignKeyViolation(message),
        &SqlState::CHECK_VIOLATION | &SqlState::NOT_NULL_VIOLATION => {
            RepositoryError::ValidationFailed(message)
        }
        &SqlState::T_R_SERIALIZATION_FAILURE | &SqlState::T_R_DEADLOCK_DETECTED => {
            RepositoryError::TransactionConflict
        }
        &SqlState::CONNECTION_EXCEPTION
        | &SqlState::CONNECTION_DOES_NOT_EXIST
        | &SqlState::CONNECTION_FAILURE => RepositoryError::ConnectionFailed(message),
        code => RepositoryError::DatabaseError(anyhow::anyhow!(
            "Database error ({}): {}",
            code.code(),
            message
        )),
    }
}

/// Owner split into the (`owner_user_id`, `guest_session_id`) column pair
pub fn owner_columns(owner: &Owner) -> (Option<Uuid>, Option<String>) {
    match owner {
        Owner::User(user) => (Some(user.0), None),
        Owner::Guest(guest) => (None, Some(guest.as_str().to_string())),
    }
}

pub fn owner_from_columns(
    user_id: Option<Uuid>,
    guest_session_id: Option<String>,
) -> anyhow::Result<Owner> {
    match (user_id, guest_session_id) {
        (Some(user), None) => Ok(Owner::User(UserId(user))),
        (None, Some(guest)) => Ok(Owner::Guest(GuestSessionId::parse(&guest)?)),
        _ => Err(anyhow::anyhow!("Row must have exactly one owner column set")),
    }
}

pub fn owner_from_row(row: &Row) -> anyhow::Result<Owner> {
    owner_from_columns(row.try_get("owner_user_id")?, row.try_get("guest_session_id")?)
}
