//! Mutating statements.
//!
//! `Statement` is a closed variant: adding a new kind is a compile-time
//! checked change in every `match` that dispatches on it. Inserts carry the
//! generated-key column names and a completion callback; the runner invokes
//! the callback only after the owning commit has durably succeeded.

use crate::value::ParamValue;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the generated keys of one committed insert.
pub type KeyConsumer = Arc<dyn Fn(&[i64]) + Send + Sync>;

/// Statement kind, for dispatch and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One mutating statement with its positional parameters.
pub enum Statement {
    Insert {
        sql: String,
        params: Vec<ParamValue>,
        /// Column names whose values the datastore generates on insert.
        key_columns: Vec<String>,
        /// Fired with the produced keys after the owning commit succeeds.
        on_keys: KeyConsumer,
    },
    Update {
        sql: String,
        params: Vec<ParamValue>,
    },
    Delete {
        sql: String,
        params: Vec<ParamValue>,
    },
}

impl Statement {
    pub fn insert(
        sql: impl Into<String>,
        params: Vec<ParamValue>,
        key_columns: Vec<String>,
        on_keys: impl Fn(&[i64]) + Send + Sync + 'static,
    ) -> Self {
        Self::Insert {
            sql: sql.into(),
            params,
            key_columns,
            on_keys: Arc::new(on_keys),
        }
    }

    pub fn update(sql: impl Into<String>, params: Vec<ParamValue>) -> Self {
        Self::Update {
            sql: sql.into(),
            params,
        }
    }

    pub fn delete(sql: impl Into<String>, params: Vec<ParamValue>) -> Self {
        Self::Delete {
            sql: sql.into(),
            params,
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            Self::Insert { .. } => StatementKind::Insert,
            Self::Update { .. } => StatementKind::Update,
            Self::Delete { .. } => StatementKind::Delete,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Self::Insert { sql, .. } | Self::Update { sql, .. } | Self::Delete { sql, .. } => sql,
        }
    }

    pub fn params(&self) -> &[ParamValue] {
        match self {
            Self::Insert { params, .. }
            | Self::Update { params, .. }
            | Self::Delete { params, .. } => params,
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Statement");
        s.field("kind", &self.kind()).field("sql", &self.sql());
        if let Self::Insert { key_columns, .. } = self {
            s.field("key_columns", key_columns);
        }
        s.field("params", &self.params().len()).finish()
    }
}
