//! SQLSTATE error codes, as used in the `C` field of `ErrorResponse` and
//! `NoticeResponse`.
//!
//! <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// A 5-character SQLSTATE code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlState(&'static str);

impl SqlState {
    // Class 00 - Successful Completion
    pub const SUCCESSFUL_COMPLETION: SqlState = SqlState("00000");

    // Class 08 - Connection Exception
    pub const CONNECTION_EXCEPTION: SqlState = SqlState("08000");
    pub const CONNECTION_FAILURE: SqlState = SqlState("08006");
    pub const PROTOCOL_VIOLATION: SqlState = SqlState("08P01");

    // Class 0A - Feature Not Supported
    pub const FEATURE_NOT_SUPPORTED: SqlState = SqlState("0A000");

    // Class 22 - Data Exception
    pub const DATA_EXCEPTION: SqlState = SqlState("22000");
    pub const INVALID_TEXT_REPRESENTATION: SqlState = SqlState("22P02");
    pub const INVALID_PARAMETER_VALUE: SqlState = SqlState("22023");

    // Class 23 - Integrity Constraint Violation
    pub const NOT_NULL_VIOLATION: SqlState = SqlState("23502");
    pub const FOREIGN_KEY_VIOLATION: SqlState = SqlState("23503");
    pub const UNIQUE_VIOLATION: SqlState = SqlState("23505");

    // Class 25 - Invalid Transaction State
    pub const ACTIVE_SQL_TRANSACTION: SqlState = SqlState("25001");
    pub const NO_ACTIVE_SQL_TRANSACTION: SqlState = SqlState("25P01");
    pub const IN_FAILED_SQL_TRANSACTION: SqlState = SqlState("25P02");

    // Class 26 - Invalid SQL Statement Name
    pub const INVALID_SQL_STATEMENT_NAME: SqlState = SqlState("26000");

    // Class 28 - Invalid Authorization Specification
    pub const INVALID_AUTHORIZATION_SPECIFICATION: SqlState = SqlState("28000");
    pub const INVALID_PASSWORD: SqlState = SqlState("28P01");

    // Class 34 - Invalid Cursor Name
    pub const INVALID_CURSOR_NAME: SqlState = SqlState("34000");

    // Class 3B - Savepoint Exception
    pub const INVALID_SAVEPOINT_SPECIFICATION: SqlState = SqlState("3B001");

    // Class 40 - Transaction Rollback
    pub const SERIALIZATION_FAILURE: SqlState = SqlState("40001");
    pub const DEADLOCK_DETECTED: SqlState = SqlState("40P01");

    // Class 42 - Syntax Error or Access Rule Violation
    pub const SYNTAX_ERROR: SqlState = SqlState("42601");
    pub const UNDEFINED_COLUMN: SqlState = SqlState("42703");
    pub const UNDEFINED_FUNCTION: SqlState = SqlState("42883");
    pub const UNDEFINED_OBJECT: SqlState = SqlState("42704");
    pub const UNDEFINED_TABLE: SqlState = SqlState("42P01");
    pub const DUPLICATE_PREPARED_STATEMENT: SqlState = SqlState("42P05");

    // Class 55 - Object Not In Prerequisite State
    pub const OBJECT_NOT_IN_PREREQUISITE_STATE: SqlState = SqlState("55000");

    // Class 57 - Operator Intervention
    pub const ADMIN_SHUTDOWN: SqlState = SqlState("57P01");

    // Class XX - Internal Error
    pub const INTERNAL_ERROR: SqlState = SqlState("XX000");

    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// The 2-character class prefix of the code.
    pub fn class(&self) -> &'static str {
        &self.0[..2]
    }
}

impl std::fmt::Display for SqlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[test]
fn test_sqlstate_class() {
    assert_eq!(SqlState::PROTOCOL_VIOLATION.class(), "08");
    assert_eq!(SqlState::IN_FAILED_SQL_TRANSACTION.class(), "25");
    assert_eq!(SqlState::INVALID_SAVEPOINT_SPECIFICATION.class(), "3B");
}
