//! Typed error type for the db crate.

use engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back onto a domain type.
    #[error("decode error in column '{column}': {message}")]
    Decode {
        column: &'static str,
        message: String,
    },
}

impl DbError {
    pub(crate) fn decode(column: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }

    fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Store-level failures surface through the engine's error type.
pub(crate) fn into_engine(err: DbError, code: Option<&str>) -> EngineError {
    match code {
        Some(code) if err.is_unique_violation() => EngineError::DuplicateCode(code.to_owned()),
        _ => EngineError::storage(err),
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        into_engine(err, None)
    }
}
