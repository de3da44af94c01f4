use thiserror::Error;

/// Outcome taxonomy for the engines. The first four variants are expected
/// business outcomes and carry a user-facing reason; the last two are store
/// failures, split by whether the retry wrapper may re-attempt them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Auth(String),

    #[error("transient store conflict: {0}")]
    TransientStore(rusqlite::Error),

    #[error("{0}")]
    FatalStore(String),
}

impl CoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        CoreError::Auth(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        CoreError::FatalStore(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientStore(_))
    }
}

/// SQLITE_BUSY and SQLITE_LOCKED are the transient transaction-conflict
/// class; everything else rusqlite reports aborts the operation outright.
pub fn is_transient_sqlite(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if matches!(
            f.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        )
    )
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        if is_transient_sqlite(&e) {
            CoreError::TransientStore(e)
        } else {
            CoreError::FatalStore(e.to_string())
        }
    }
}
