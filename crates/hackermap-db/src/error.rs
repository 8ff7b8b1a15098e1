use hackermap_types::error::Conflict;
use hackermap_types::forms::FormErrors;
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("invalid input: {0}")]
    Invalid(FormErrors),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid(FormErrors::single(field, message))
    }

    /// True when SQLite rejected a write because of a CHECK, UNIQUE or
    /// foreign key constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
