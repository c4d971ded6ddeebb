//! Transaction-control state transitions.
//!
//! The executor recognizes `BEGIN`/`COMMIT`/savepoint statements and hands
//! back a [`TransactionOp`](crate::executor::TransactionOp); this module
//! applies the transition to the session state and produces either the
//! command tag or the error the client should see.

use crate::executor::TransactionOp;
use crate::message::Notice;
use crate::sqlstate::SqlState;
use crate::state::{SessionState, TransactionStatus};

/// Apply a transaction-control operation, returning the command tag on
/// success. On error the session state is left untouched.
pub(crate) fn apply(state: &mut SessionState, op: TransactionOp) -> Result<&'static str, Notice> {
    match op {
        TransactionOp::Begin(modes) => {
            if state.in_transaction() {
                // real servers downgrade a nested BEGIN to a warning; here
                // it is a hard error
                return Err(Notice::error(
                    SqlState::ACTIVE_SQL_TRANSACTION,
                    "there is already a transaction in progress",
                ));
            }

            state.transaction_status = TransactionStatus::Transaction;
            state.transaction_modes = Some(modes);

            Ok("BEGIN")
        }

        TransactionOp::Commit => match state.transaction_status {
            TransactionStatus::Idle => Err(Notice::error(
                SqlState::NO_ACTIVE_SQL_TRANSACTION,
                "there is no transaction in progress",
            )),

            TransactionStatus::Transaction => {
                end_transaction(state);
                Ok("COMMIT")
            }

            // committing a failed transaction rolls it back; the tag says so
            TransactionStatus::Failed => {
                end_transaction(state);
                Ok("ROLLBACK")
            }
        },

        TransactionOp::Rollback => {
            if !state.in_transaction() {
                return Err(Notice::error(
                    SqlState::NO_ACTIVE_SQL_TRANSACTION,
                    "there is no transaction in progress",
                ));
            }

            end_transaction(state);

            Ok("ROLLBACK")
        }

        TransactionOp::Savepoint(name) => {
            if !state.in_transaction() {
                return Err(no_transaction_for("SAVEPOINT"));
            }

            state.define_savepoint(&name);

            Ok("SAVEPOINT")
        }

        TransactionOp::RollbackTo(name) => {
            if !state.in_transaction() {
                return Err(no_transaction_for("ROLLBACK TO SAVEPOINT"));
            }

            if !state.rollback_to_savepoint(&name) {
                return Err(unknown_savepoint(&name));
            }

            // rolling back to a savepoint recovers a failed transaction
            state.transaction_status = TransactionStatus::Transaction;

            Ok("ROLLBACK")
        }

        TransactionOp::Release(name) => {
            if !state.in_transaction() {
                return Err(no_transaction_for("RELEASE SAVEPOINT"));
            }

            if !state.release_savepoint(&name) {
                return Err(unknown_savepoint(&name));
            }

            Ok("RELEASE")
        }
    }
}

fn end_transaction(state: &mut SessionState) {
    state.transaction_status = TransactionStatus::Idle;
    state.transaction_modes = None;
    state.clear_savepoints();
}

fn no_transaction_for(command: &str) -> Notice {
    Notice::error(
        SqlState::NO_ACTIVE_SQL_TRANSACTION,
        format!("{command} can only be used in transaction blocks"),
    )
}

fn unknown_savepoint(name: &str) -> Notice {
    Notice::error(
        SqlState::INVALID_SAVEPOINT_SPECIFICATION,
        format!("savepoint \"{name}\" does not exist"),
    )
}
