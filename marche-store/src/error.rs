use marche_core::CoreError;
use marche_order::RepositoryError;

const UNIQUE_VIOLATION: &str = "23505";

/// Map a driver error onto the repository error seen by the engine.
pub(crate) fn storage_error(entity: &'static str, err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => RepositoryError::Duplicate {
            entity,
            id: db.constraint().unwrap_or("unique").to_string(),
        },
        _ => RepositoryError::Storage(err.to_string()),
    }
}

/// A stored value the domain does not recognise.
pub(crate) fn decode_error(err: CoreError) -> RepositoryError {
    RepositoryError::Storage(format!("corrupt row: {}", err))
}

pub(crate) fn out_of_range(column: &'static str, value: i64) -> RepositoryError {
    RepositoryError::Storage(format!("corrupt row: {} out of range ({})", column, value))
}
