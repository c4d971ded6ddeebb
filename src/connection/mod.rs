//! One client connection: the per-connection protocol state machine.
//!
//! The driver owns the stream, the session state, and a handle to the
//! executor; the server's connection table holds connections, connections
//! hold nothing of the server beyond the shared record they were given.
//!
//! Every incoming frame produces its whole response batch before the next
//! frame is read; within a connection there are no interleaved responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, warn};

mod extended;
mod sasl;
mod startup;
mod stream;

pub(crate) use stream::PgStream;

use crate::error::{err_protocol, Error, Result};
use crate::executor::{QueryExecutor, ResultEvent, TransactionOp};
use crate::message::{
    CommandComplete, DataRow, EmptyQueryResponse, ErrorResponse, FrontendMessageFormat, Message,
    Notice, NoticeResponse, NotificationResponse, ParameterStatus, Query, ReadyForQuery,
    RowDescription,
};
use crate::server::ServerShared;
use crate::sqlstate::SqlState;
use crate::state::{SessionState, TransactionStatus};
use crate::transaction;

pub(crate) struct Connection<E> {
    stream: PgStream,
    state: SessionState,
    executor: Arc<E>,
    shared: Arc<ServerShared>,

    last_activity: Arc<AtomicU64>,
    shutdown: watch::Receiver<bool>,

    // an error inside an extended-query sequence discards everything up to
    // the next Sync
    sequence_failed: bool,
}

impl<E> Connection<E>
where
    E: QueryExecutor,
{
    pub(crate) fn new(
        socket: TcpStream,
        backend_pid: u32,
        backend_secret: u32,
        executor: Arc<E>,
        shared: Arc<ServerShared>,
        last_activity: Arc<AtomicU64>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream: PgStream::new(socket),
            state: SessionState::new(backend_pid, backend_secret),
            executor,
            shared,
            last_activity,
            shutdown,
            sequence_failed: false,
        }
    }

    /// Drive the connection to completion. Errors end the connection; they
    /// are reported to the peer where the protocol allows and logged here.
    pub(crate) async fn run(mut self) {
        match self.run_inner().await {
            Ok(()) => debug!(
                uptime_ms = self.state.connected_at.elapsed().as_millis() as u64,
                queries = self.state.queries_executed(),
                "connection closed"
            ),

            Err(Error::Disconnected) => debug!("client disconnected"),

            Err(Error::Protocol(message)) => {
                warn!("protocol violation: {message}");

                // best effort; the peer may be the reason we are here
                let notice =
                    Notice::fatal(SqlState::PROTOCOL_VIOLATION, message.into_string());
                self.stream.write(ErrorResponse(&notice));
                let _ = self.stream.flush().await;
            }

            Err(Error::Authentication(reason)) => {
                // the client already received a generic 28000
                warn!("authentication failed: {reason}");
            }

            Err(err) => warn!("connection error: {err}"),
        }

        self.stream.shutdown().await;
    }

    async fn run_inner(&mut self) -> Result<()> {
        if !self.startup().await? {
            return Ok(());
        }

        loop {
            // pending reads are interrupted by shutdown, not by a
            // cooperative token; the drain deadline force-closes stragglers
            let message = {
                let stream = &mut self.stream;
                let shutdown = &mut self.shutdown;

                tokio::select! {
                    biased;

                    _ = shutdown.changed() => None,
                    message = stream.recv() => Some(message?),
                }
            };

            let Some(message) = message else {
                return self.shutdown_notice().await;
            };

            self.touch();

            match message.format {
                FrontendMessageFormat::Query => self.handle_query(message).await?,

                FrontendMessageFormat::Parse
                | FrontendMessageFormat::Bind
                | FrontendMessageFormat::Describe
                | FrontendMessageFormat::Execute
                | FrontendMessageFormat::Close
                | FrontendMessageFormat::Flush
                | FrontendMessageFormat::Sync => self.handle_extended(message).await?,

                FrontendMessageFormat::Terminate => return Ok(()),

                FrontendMessageFormat::FunctionCall => {
                    self.report_statement_error(Notice::error(
                        SqlState::FEATURE_NOT_SUPPORTED,
                        "fastpath function calls are not supported",
                    ))
                    .await?;

                    self.stream
                        .write(ReadyForQuery(self.state.transaction_status()));
                    self.stream.flush().await?;
                }

                // COPY sub-protocol frames are tolerated as no-ops; the
                // executor never initiates a copy
                FrontendMessageFormat::CopyData
                | FrontendMessageFormat::CopyDone
                | FrontendMessageFormat::CopyFail => {
                    debug!(format = ?message.format, "ignoring COPY message");
                }

                FrontendMessageFormat::Password => {
                    return Err(err_protocol!("unexpected Password message after startup"));
                }
            }
        }
    }

    // -- simple query protocol ---------------------------------------------

    async fn handle_query(&mut self, message: Message) -> Result<()> {
        let Query(sql) = message.decode()?;

        let mut ran_any = false;

        for statement in split_statements(&sql) {
            if statement.trim().is_empty() {
                continue;
            }

            ran_any = true;

            if !self.execute_statement(statement).await? {
                // first error ends the batch
                break;
            }
        }

        // "" and ";" alike produce the empty-query response
        if !ran_any {
            self.stream.write(EmptyQueryResponse);
        }

        self.stream
            .write(ReadyForQuery(self.state.transaction_status()));

        self.stream.flush().await
    }

    /// Run one statement through the executor and stream its events.
    /// Returns false when the statement errored.
    async fn execute_statement(&mut self, sql: &str) -> Result<bool> {
        self.state.record_query();
        self.shared.stats.queries_executed.fetch_add(1, Ordering::Relaxed);

        let events = self.executor.execute(sql, &self.state);

        if self.state.transaction_status() == TransactionStatus::Failed
            && !recovers_failed_transaction(&events)
        {
            self.report_statement_error(in_failed_transaction()).await?;
            return Ok(false);
        }

        for event in events {
            match event {
                ResultEvent::RowDescription(fields) => {
                    self.stream.write(RowDescription { fields: &fields });
                }

                ResultEvent::DataRow(values) => {
                    self.stream.write(DataRow(&values));
                }

                ResultEvent::CommandComplete(tag) => {
                    self.stream.write(CommandComplete(&tag));
                }

                ResultEvent::EmptyQuery => {
                    self.stream.write(EmptyQueryResponse);
                }

                ResultEvent::Error(notice) => {
                    self.report_statement_error(notice).await?;
                    return Ok(false);
                }

                other => {
                    if let Err(notice) = self.apply_session_event(other) {
                        self.report_statement_error(notice).await?;
                        return Ok(false);
                    }
                }
            }
        }

        Ok(true)
    }

    /// Apply an event that mutates session state (transaction control,
    /// SET, LISTEN/NOTIFY), writing any frames it implies.
    fn apply_session_event(&mut self, event: ResultEvent) -> Result<(), Notice> {
        match event {
            ResultEvent::Transaction(op) => {
                let tag = transaction::apply(&mut self.state, op)?;
                self.stream.write(CommandComplete(tag));
            }

            ResultEvent::SetParameter { name, value } => {
                let name = self.state.set_parameter(name, value.clone());

                self.stream.write(ParameterStatus {
                    name: &name,
                    value: &value,
                });
            }

            ResultEvent::Listen(channel) => self.state.listen(&channel),

            ResultEvent::Unlisten(channel) => self.state.unlisten(channel.as_deref()),

            ResultEvent::Notify { channel, payload } => {
                if self.state.is_listening(&channel) {
                    self.stream.write(NotificationResponse {
                        process_id: self.state.backend_pid(),
                        channel: &channel,
                        payload: &payload,
                    });
                }
            }

            // row/tag events are handled by the callers
            _ => {}
        }

        Ok(())
    }

    // -- error funnel ------------------------------------------------------

    /// The one place outgoing `ErrorResponse` frames are produced. An
    /// error inside an open transaction fails it.
    async fn report_statement_error(&mut self, mut notice: Notice) -> Result<()> {
        if self.state.transaction_status() == TransactionStatus::Transaction {
            self.state.transaction_status = TransactionStatus::Failed;
        }

        if !self.shared.options.debug_errors {
            notice.redact();
        }

        self.stream.write(ErrorResponse(&notice));
        self.stream.flush().await
    }

    // -- shutdown ----------------------------------------------------------

    /// Graceful-shutdown farewell: a notice, a rollback of any open
    /// transaction, and a final `ReadyForQuery('I')`.
    async fn shutdown_notice(&mut self) -> Result<()> {
        let notice = Notice::notice(SqlState::ADMIN_SHUTDOWN, "server is shutting down");
        self.stream.write(NoticeResponse(&notice));

        if self.state.in_transaction() {
            self.state.transaction_status = TransactionStatus::Idle;
            self.state.transaction_modes = None;
            self.state.clear_savepoints();
        }

        self.stream.write(ReadyForQuery(TransactionStatus::Idle));
        self.stream.flush().await?;

        Ok(())
    }

    fn touch(&self) {
        self.last_activity.store(
            self.shared.started.elapsed().as_millis() as u64,
            Ordering::Relaxed,
        );
    }
}

fn recovers_failed_transaction(events: &[ResultEvent]) -> bool {
    matches!(
        events.first(),
        Some(ResultEvent::Transaction(
            TransactionOp::Commit | TransactionOp::Rollback | TransactionOp::RollbackTo(_)
        ))
    )
}

fn in_failed_transaction() -> Notice {
    Notice::error(
        SqlState::IN_FAILED_SQL_TRANSACTION,
        "current transaction is aborted, commands ignored until end of transaction block",
    )
}

/// Split a simple-query body into `;`-separated statements, ignoring
/// semicolons inside quotes, dollar-quoted bodies, and line comments.
pub(crate) fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }

            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }

            b'$' => {
                // $tag$ … $tag$
                if let Some(close) = dollar_quote_end(sql, i) {
                    i = close;
                }
            }

            b';' => {
                parts.push(&sql[start..i]);
                start = i + 1;
            }

            _ => {}
        }

        i += 1;
    }

    parts.push(&sql[start..]);

    parts
}

// Returns the index of the last byte of the closing delimiter, or None if
// `at` does not open a dollar quote.
fn dollar_quote_end(sql: &str, at: usize) -> Option<usize> {
    let rest = &sql[at + 1..];

    let tag_len = rest
        .find(|c: char| !c.is_alphanumeric() && c != '_')
        .unwrap_or(rest.len());

    if !rest[tag_len..].starts_with('$') {
        return None;
    }

    let delimiter = &sql[at..at + tag_len + 2];
    let body_start = at + delimiter.len();

    sql[body_start..]
        .find(delimiter)
        .map(|found| body_start + found + delimiter.len() - 1)
}
