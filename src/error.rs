//! Error types for the statement-execution engine.
//!
//! All errors are defined with `thiserror`. Database failures keep the
//! native SQLSTATE and the failing statement text so a caller can diagnose
//! the root cause without the engine wrapping it into something generic.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Native SQLSTATE, e.g. "40001" for a serialization conflict.
        sql_state: Option<String>,
        /// SQL text of the failing statement, when known.
        statement: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Rollback failed: {message}")]
    Rollback {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Row mapping failed at row {index}: {message}")]
    RowMapping { index: u64, message: String },

    #[error("Operation handler has been closed")]
    Closed,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a database error with optional SQLSTATE.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            statement: None,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a rollback error.
    pub fn rollback(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Rollback {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a row mapping error.
    pub fn row_mapping(index: u64, message: impl Into<String>) -> Self {
        Self::RowMapping {
            index,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Native SQLSTATE carried by this error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            Self::Rollback { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// SQL text of the failing statement, if known.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Database { statement, .. } => statement.as_deref(),
            _ => None,
        }
    }

    /// Attach the failing statement text to a database error.
    ///
    /// Other error kinds pass through unchanged.
    pub fn with_statement(self, sql: &str) -> Self {
        match self {
            Self::Database {
                message,
                sql_state,
                statement: None,
            } => Self::Database {
                message,
                sql_state,
                statement: Some(sql.to_string()),
            },
            other => other,
        }
    }
}

/// Convert sqlx errors to DbError, preserving the native error code.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(db_err.message(), code)
            }
            sqlx::Error::Configuration(msg) => DbError::connection(msg.to_string()),
            sqlx::Error::PoolTimedOut => {
                DbError::connection("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => DbError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("Protocol error: {}", msg)),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for engine operations.
pub type DbResult<T> = Result<T, DbError>;
