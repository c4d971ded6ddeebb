//! pgmock: a mock PostgreSQL server speaking the v3 wire protocol.
//!
//! Clients built against real PostgreSQL drivers can connect, authenticate
//! (trust or SCRAM-SHA-256, optionally over TLS), issue simple and
//! extended-protocol queries, and run transactions; there is no database
//! engine underneath, only protocol fidelity. Intended for driver testing,
//! local development, and integration tests where the wire matters but the
//! data does not.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), pgmock::Error> {
//! use pgmock::{PgMockOptions, PgMockServer};
//!
//! let server = PgMockServer::bind(PgMockOptions::new().port(0)).await?;
//! let addr = server.local_addr();
//!
//! // point any PostgreSQL driver at `addr` ...
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod array;
mod connection;
pub mod error;
mod executor;
mod io;
pub mod message;
mod mock;
mod net;
mod options;
mod scram;
mod server;
pub mod sqlstate;
mod state;
mod transaction;
pub mod types;

pub use error::{Error, Result};
pub use executor::{QueryExecutor, ResultEvent, TransactionOp};
pub use message::{Field, Notice, PgSeverity};
pub use mock::MockExecutor;
pub use options::{AuthMethod, PgMockOptions, TlsOptions, TlsVersion};
pub use scram::ScramCredentials;
pub use server::{PgMockServer, ServerStats};
pub use sqlstate::SqlState;
pub use state::{
    PreparedStatement, SessionState, TransactionModes, TransactionStatus, UNNAMED,
};
pub use types::{Oid, TypeFormat};
