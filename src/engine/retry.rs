//! Transient-failure classification and the per-invocation retry budget.
//!
//! Classification is a pure function over the native SQLSTATE, not an
//! exception hierarchy: the connection-reset class and the
//! serialization/deadlock-conflict class are transient, everything else is
//! fatal.

use crate::error::DbError;

/// SQLSTATE class for a broken/reset connection.
const SQLSTATE_CONNECTION_RESET: &str = "08S01";
/// SQLSTATE for a serialization failure (deadlock victim, write conflict).
const SQLSTATE_SERIALIZATION_CONFLICT: &str = "40001";

/// How a database failure is handled by the transaction runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely spurious; the whole batch is retried while budget remains.
    Transient,
    /// Propagated immediately, no retry.
    Fatal,
}

/// Classify a native SQLSTATE.
pub fn classify(sql_state: Option<&str>) -> ErrorClass {
    match sql_state {
        Some(SQLSTATE_CONNECTION_RESET) | Some(SQLSTATE_SERIALIZATION_CONFLICT) => {
            ErrorClass::Transient
        }
        _ => ErrorClass::Fatal,
    }
}

/// Classify a database error by its carried SQLSTATE.
pub fn classify_error(err: &DbError) -> ErrorClass {
    classify(err.sql_state())
}

/// Mutable retry bookkeeping for one runner invocation.
#[derive(Debug)]
pub struct RetryState {
    budget: u32,
    /// SQL of the most recently attempted statement, for diagnostics only.
    last_statement: Option<String>,
}

impl RetryState {
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            last_statement: None,
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Spend one attempt from the budget.
    pub fn consume(&mut self) {
        self.budget = self.budget.saturating_sub(1);
    }

    /// Force exhaustion, e.g. after a failed rollback.
    pub fn exhaust(&mut self) {
        self.budget = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.budget == 0
    }

    pub fn note_statement(&mut self, sql: &str) {
        self.last_statement = Some(sql.to_string());
    }

    pub fn last_statement(&self) -> Option<&str> {
        self.last_statement.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_states() {
        assert_eq!(classify(Some("08S01")), ErrorClass::Transient);
        assert_eq!(classify(Some("40001")), ErrorClass::Transient);
    }

    #[test]
    fn test_fatal_states() {
        // Constraint violation, syntax error, and unknown states are fatal
        assert_eq!(classify(Some("23505")), ErrorClass::Fatal);
        assert_eq!(classify(Some("42601")), ErrorClass::Fatal);
        assert_eq!(classify(None), ErrorClass::Fatal);
    }

    #[test]
    fn test_classify_error_reads_sql_state() {
        let transient = DbError::database("deadlock", Some("40001".to_string()));
        let fatal = DbError::database("duplicate key", Some("23505".to_string()));
        assert_eq!(classify_error(&transient), ErrorClass::Transient);
        assert_eq!(classify_error(&fatal), ErrorClass::Fatal);
    }

    #[test]
    fn test_retry_state_consumption() {
        let mut state = RetryState::new(2);
        assert!(!state.is_exhausted());
        state.consume();
        assert_eq!(state.budget(), 1);
        state.consume();
        assert!(state.is_exhausted());
        // Saturates at zero
        state.consume();
        assert_eq!(state.budget(), 0);
    }

    #[test]
    fn test_retry_state_exhaust() {
        let mut state = RetryState::new(5);
        state.exhaust();
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_last_statement_tracking() {
        let mut state = RetryState::new(5);
        assert!(state.last_statement().is_none());
        state.note_statement("DELETE FROM t WHERE id = ?");
        assert_eq!(state.last_statement(), Some("DELETE FROM t WHERE id = ?"));
    }
}
