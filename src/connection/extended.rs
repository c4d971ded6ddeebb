//! The extended query sub-protocol: Parse/Bind/Describe/Execute and the
//! Sync boundary.
//!
//! Responses accumulate in the write buffer and go out on `Sync` or
//! `Flush`, as the protocol intends. An error emits `ErrorResponse` once
//! and silently discards everything up to the next `Sync`; no
//! `ReadyForQuery` is sent at error time.

use crate::error::Result;
use crate::executor::{QueryExecutor, ResultEvent};
use crate::message::{
    Bind, BindComplete, Close, CloseComplete, CommandComplete, DataRow, Describe,
    EmptyQueryResponse, Execute, FrontendMessageFormat, Message, NoData, Notice,
    ParameterDescription, Parse, ParseComplete, PortalSuspended, ReadyForQuery, RowDescription,
};
use crate::sqlstate::SqlState;
use crate::state::{Portal, PreparedStatement, TransactionStatus};

use super::{in_failed_transaction, recovers_failed_transaction, Connection};

impl<E> Connection<E>
where
    E: QueryExecutor,
{
    pub(super) async fn handle_extended(&mut self, message: Message) -> Result<()> {
        if self.sequence_failed && message.format != FrontendMessageFormat::Sync {
            return Ok(());
        }

        match message.format {
            FrontendMessageFormat::Parse => self.handle_parse(message.decode()?).await,
            FrontendMessageFormat::Bind => self.handle_bind(message.decode()?).await,
            FrontendMessageFormat::Describe => self.handle_describe(message.decode()?).await,
            FrontendMessageFormat::Execute => self.handle_execute(message.decode()?).await,
            FrontendMessageFormat::Close => self.handle_close(message.decode()?),

            FrontendMessageFormat::Flush => self.stream.flush().await,

            FrontendMessageFormat::Sync => {
                self.state.clear_unnamed();
                self.sequence_failed = false;

                self.stream
                    .write(ReadyForQuery(self.state.transaction_status()));

                self.stream.flush().await
            }

            _ => unreachable!("routed by caller"),
        }
    }

    async fn handle_parse(&mut self, parse: Parse) -> Result<()> {
        // the unnamed statement is overwritten freely; named statements
        // must be closed first
        if !parse.statement.is_empty() && self.state.statement(&parse.statement).is_some() {
            return self
                .extended_error(Notice::error(
                    SqlState::DUPLICATE_PREPARED_STATEMENT,
                    format!("prepared statement \"{}\" already exists", parse.statement),
                ))
                .await;
        }

        self.state.put_statement(
            parse.statement,
            PreparedStatement {
                query: parse.query,
                param_types: parse.param_types,
            },
        );

        self.stream.write(ParseComplete);

        Ok(())
    }

    async fn handle_bind(&mut self, bind: Bind) -> Result<()> {
        let Some(statement) = self.state.statement(&bind.statement) else {
            return self
                .extended_error(unknown_statement(&bind.statement))
                .await;
        };

        let portal = Portal {
            statement: bind.statement.clone(),
            query: statement.query.clone(),
            params: bind.params,
        };

        self.state.put_portal(bind.portal, portal);
        self.stream.write(BindComplete);

        Ok(())
    }

    async fn handle_describe(&mut self, describe: Describe) -> Result<()> {
        match describe {
            Describe::Statement(name) => {
                let Some(statement) = self.state.statement(&name) else {
                    return self.extended_error(unknown_statement(&name)).await;
                };

                let param_types = statement.param_types.clone();
                let query = statement.query.clone();

                self.stream.write(ParameterDescription(&param_types));

                match self.executor.describe(&query, &self.state) {
                    Some(fields) => self.stream.write(RowDescription { fields: &fields }),
                    None => self.stream.write(NoData),
                }
            }

            Describe::Portal(name) => {
                let Some(portal) = self.state.portal(&name) else {
                    return self.extended_error(unknown_portal(&name)).await;
                };

                let query = portal.query.clone();

                match self.executor.describe(&query, &self.state) {
                    Some(fields) => self.stream.write(RowDescription { fields: &fields }),
                    None => self.stream.write(NoData),
                }
            }
        }

        Ok(())
    }

    async fn handle_execute(&mut self, execute: Execute) -> Result<()> {
        let Some(portal) = self.state.portal(&execute.portal) else {
            return self.extended_error(unknown_portal(&execute.portal)).await;
        };

        let query = portal.query.clone();

        self.state.record_query();
        self.shared
            .stats
            .queries_executed
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let events = self.executor.execute(&query, &self.state);

        if self.state.transaction_status() == TransactionStatus::Failed
            && !recovers_failed_transaction(&events)
        {
            return self.extended_error(in_failed_transaction()).await;
        }

        let mut rows = 0;

        for event in events {
            match event {
                // Execute never re-sends the row description; Describe does
                ResultEvent::RowDescription(_) => {}

                ResultEvent::DataRow(values) => {
                    if execute.limit > 0 && rows == execute.limit {
                        self.stream.write(PortalSuspended);
                        return Ok(());
                    }

                    rows += 1;
                    self.stream.write(DataRow(&values));
                }

                ResultEvent::CommandComplete(tag) => {
                    self.stream.write(CommandComplete(&tag));
                }

                ResultEvent::EmptyQuery => {
                    self.stream.write(EmptyQueryResponse);
                }

                ResultEvent::Error(notice) => {
                    return self.extended_error(notice).await;
                }

                other => {
                    if let Err(notice) = self.apply_session_event(other) {
                        return self.extended_error(notice).await;
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_close(&mut self, close: Close) -> Result<()> {
        // closing an unknown name is explicitly not an error
        match close {
            Close::Statement(name) => self.state.remove_statement(&name),
            Close::Portal(name) => self.state.remove_portal(&name),
        }

        self.stream.write(CloseComplete);

        Ok(())
    }

    /// Report an error inside the sequence and start discarding until the
    /// next `Sync`.
    async fn extended_error(&mut self, notice: Notice) -> Result<()> {
        self.sequence_failed = true;
        self.report_statement_error(notice).await
    }
}

fn unknown_statement(name: &str) -> Notice {
    Notice::error(
        SqlState::INVALID_SQL_STATEMENT_NAME,
        format!("prepared statement \"{name}\" does not exist"),
    )
}

fn unknown_portal(name: &str) -> Notice {
    Notice::error(
        SqlState::INVALID_CURSOR_NAME,
        format!("portal \"{name}\" does not exist"),
    )
}
