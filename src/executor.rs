//! The seam between the protocol machine and whatever synthesizes results.
//!
//! The connection driver never inspects SQL itself; it hands each statement
//! to a [`QueryExecutor`] and transmits the events that come back. Values
//! crossing this interface are already UTF-8 text in the client encoding.

use crate::message::{Field, Notice};
use crate::state::{SessionState, TransactionModes};

/// A transaction-control operation recognized by the executor. The
/// connection driver applies the transition to the session state and emits
/// the resulting command tag (or error).
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOp {
    Begin(TransactionModes),
    Commit,
    Rollback,
    Savepoint(String),
    Release(String),
    RollbackTo(String),
}

/// One event of a statement's result stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEvent {
    /// Describes the columns of the rows that follow.
    RowDescription(Vec<Field>),

    /// One row; `None` values travel as NULL.
    DataRow(Vec<Option<String>>),

    /// The statement finished with this command tag.
    CommandComplete(String),

    /// The statement was empty.
    EmptyQuery,

    /// The statement failed; the connection stays open.
    Error(Notice),

    /// Transaction control; applied to the session by the driver.
    Transaction(TransactionOp),

    /// `SET`: the driver updates the session parameter and pushes a
    /// `ParameterStatus` frame before completing the command.
    SetParameter { name: String, value: String },

    /// `LISTEN` / `UNLISTEN` (`None` unlistens everything).
    Listen(String),
    Unlisten(Option<String>),

    /// `NOTIFY`: delivered back to this session when it listens on the
    /// channel.
    Notify { channel: String, payload: String },
}

/// Produces result events for one SQL statement.
///
/// Implementations are pure with respect to the connection: they may read
/// the session state (parameters, transaction status) but all mutation
/// happens in the driver, by applying the returned events.
pub trait QueryExecutor: Send + Sync + 'static {
    fn execute(&self, query: &str, session: &SessionState) -> Vec<ResultEvent>;

    /// The row description a statement would produce, for `Describe`;
    /// `None` when it returns no rows.
    ///
    /// The default derives the answer from [`execute`](Self::execute),
    /// which is sound for any side-effect-free implementation.
    fn describe(&self, query: &str, session: &SessionState) -> Option<Vec<Field>> {
        self.execute(query, session)
            .into_iter()
            .find_map(|event| match event {
                ResultEvent::RowDescription(fields) => Some(fields),
                _ => None,
            })
    }
}
