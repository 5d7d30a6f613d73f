use thiserror::Error;

/// Broad classification of a [`SqlBridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening or closing the driver handle failed.
    Connection,
    /// The driver rejected a statement (malformed SQL, constraint violation, busy/locked, ...).
    Operational,
    /// The caller used a handle in a state that does not allow the operation.
    Usage,
    /// Internal handoff failure between the caller and the worker thread.
    Bridge,
    /// Invalid connection options.
    Config,
}

#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Failed to open SQLite database {target}: {source}")]
    OpenError {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    OperationalError(#[from] rusqlite::Error),

    #[error("Could not decode text in column {column} with the active text factory")]
    TextDecodeError { column: usize },

    #[error("Usage error: {0}")]
    UsageError(String),

    #[error("Bridge error: {0}")]
    BridgeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlBridgeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionError(_) | Self::OpenError { .. } => ErrorKind::Connection,
            Self::OperationalError(_) | Self::TextDecodeError { .. } => ErrorKind::Operational,
            Self::UsageError(_) => ErrorKind::Usage,
            Self::BridgeError(_) => ErrorKind::Bridge,
            Self::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// The driver error behind this failure, if there is one.
    #[must_use]
    pub fn sqlite_error(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::OperationalError(err) | Self::OpenError { source: err, .. } => Some(err),
            _ => None,
        }
    }

    /// The SQLite primary result code reported by the driver, if any.
    #[must_use]
    pub fn sqlite_error_code(&self) -> Option<rusqlite::ErrorCode> {
        self.sqlite_error().and_then(rusqlite::Error::sqlite_error_code)
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::UsageError(message.into())
    }

    pub(crate) fn closed() -> Self {
        Self::UsageError("connection closed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_keep_their_code() {
        let err = SqlBridgeError::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: t.id".into()),
        ));
        assert_eq!(err.kind(), ErrorKind::Operational);
        assert_eq!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn kinds_cover_every_variant() {
        assert_eq!(SqlBridgeError::closed().kind(), ErrorKind::Usage);
        assert_eq!(
            SqlBridgeError::BridgeError("x".into()).kind(),
            ErrorKind::Bridge
        );
        assert_eq!(
            SqlBridgeError::TextDecodeError { column: 1 }.kind(),
            ErrorKind::Operational
        );
        assert_eq!(
            SqlBridgeError::ConnectionError("x".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(SqlBridgeError::ConfigError("x".into()).kind(), ErrorKind::Config);
    }
}
