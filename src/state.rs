//! Per-connection session state.
//!
//! A pure data object, exclusively owned by the connection's task; the
//! protocol state machine mutates it, it performs no I/O of its own.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use crate::types::Oid;

/// The transaction status carried in the trailing byte of `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Not in a transaction block.
    Idle = b'I',

    /// In a transaction block.
    Transaction = b'T',

    /// In a _failed_ transaction block. Statements are rejected until the
    /// block is rolled back (fully or to a savepoint).
    Failed = b'E',
}

impl TransactionStatus {
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Options parsed from `BEGIN`/`START TRANSACTION`. Stored for fidelity,
/// not enforced; there is no engine underneath to enforce them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionModes {
    pub isolation_level: Option<String>,
    pub read_only: Option<bool>,
    pub deferrable: Option<bool>,
}

/// A statement registered via `Parse`.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub query: String,
    pub param_types: Vec<Oid>,
}

/// An execution instance of a prepared statement, created by `Bind`.
#[derive(Debug, Clone)]
pub struct Portal {
    pub statement: String,
    pub query: String,
    pub params: Vec<Option<Vec<u8>>>,
}

/// The name of the unnamed prepared statement and the unnamed portal.
pub const UNNAMED: &str = "";

pub struct SessionState {
    authenticated: bool,
    pub(crate) protocol_version: u32,
    backend_pid: u32,
    backend_secret: u32,

    parameters: HashMap<String, String>,

    pub(crate) transaction_status: TransactionStatus,
    pub(crate) transaction_modes: Option<TransactionModes>,
    savepoints: Vec<String>,

    statements: HashMap<String, PreparedStatement>,
    portals: HashMap<String, Portal>,

    // channels this session LISTENs on; notifications are delivered only to
    // the session that issued the NOTIFY (there are no other backends)
    channels: HashSet<String>,

    pub(crate) connected_at: Instant,
    queries_executed: u64,
}

impl SessionState {
    pub fn new(backend_pid: u32, backend_secret: u32) -> Self {
        Self {
            authenticated: false,
            protocol_version: 0,
            backend_pid,
            backend_secret,
            parameters: HashMap::new(),
            transaction_status: TransactionStatus::Idle,
            transaction_modes: None,
            savepoints: Vec::new(),
            statements: HashMap::new(),
            portals: HashMap::new(),
            channels: HashSet::new(),
            connected_at: Instant::now(),
            queries_executed: 0,
        }
    }

    pub fn backend_pid(&self) -> u32 {
        self.backend_pid
    }

    // Deliberately narrow: the secret is written into `BackendKeyData` and
    // must not travel anywhere else.
    pub(crate) fn backend_secret(&self) -> u32 {
        self.backend_secret
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    /// Look up a startup/`SET` parameter. An empty string is a legitimate
    /// stored value, distinct from an absent key. Names compare
    /// case-insensitively, as GUC names do.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.parameters.get(name) {
            return Some(value);
        }

        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Store a parameter, preserving the casing of an existing key so
    /// `ParameterStatus` always reports the canonical spelling. Returns
    /// that canonical name.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) -> String {
        let name = name.into();

        let canonical = self
            .parameters
            .keys()
            .find(|key| key.eq_ignore_ascii_case(&name))
            .cloned()
            .unwrap_or(name);

        self.parameters.insert(canonical.clone(), value.into());

        canonical
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn in_transaction(&self) -> bool {
        !matches!(self.transaction_status, TransactionStatus::Idle)
    }

    // -- savepoints --------------------------------------------------------

    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    /// Register a savepoint. Re-using an existing name discards the old
    /// entry and everything above it before pushing the new one.
    pub fn define_savepoint(&mut self, name: &str) {
        if let Some(index) = self.savepoints.iter().position(|sp| sp == name) {
            self.savepoints.truncate(index);
        }

        self.savepoints.push(name.to_owned());
    }

    /// Discard savepoints above `name`, retaining `name` itself. Returns
    /// false when the savepoint does not exist.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> bool {
        match self.savepoints.iter().position(|sp| sp == name) {
            Some(index) => {
                self.savepoints.truncate(index + 1);
                true
            }

            None => false,
        }
    }

    /// Discard `name` and everything above it. Returns false when the
    /// savepoint does not exist.
    pub fn release_savepoint(&mut self, name: &str) -> bool {
        match self.savepoints.iter().position(|sp| sp == name) {
            Some(index) => {
                self.savepoints.truncate(index);
                true
            }

            None => false,
        }
    }

    pub fn clear_savepoints(&mut self) {
        self.savepoints.clear();
    }

    // -- prepared statements and portals -----------------------------------

    pub fn statement(&self, name: &str) -> Option<&PreparedStatement> {
        self.statements.get(name)
    }

    pub fn put_statement(&mut self, name: impl Into<String>, statement: PreparedStatement) {
        self.statements.insert(name.into(), statement);
    }

    pub fn remove_statement(&mut self, name: &str) {
        self.statements.remove(name);
    }

    pub fn portal(&self, name: &str) -> Option<&Portal> {
        self.portals.get(name)
    }

    pub fn put_portal(&mut self, name: impl Into<String>, portal: Portal) {
        self.portals.insert(name.into(), portal);
    }

    pub fn remove_portal(&mut self, name: &str) {
        self.portals.remove(name);
    }

    /// Drop the unnamed prepared statement and the unnamed portal; runs on
    /// every `Sync`.
    pub fn clear_unnamed(&mut self) {
        self.statements.remove(UNNAMED);
        self.portals.remove(UNNAMED);
    }

    // -- notification channels ---------------------------------------------

    pub fn listen(&mut self, channel: &str) {
        self.channels.insert(channel.to_owned());
    }

    pub fn unlisten(&mut self, channel: Option<&str>) {
        match channel {
            Some(channel) => {
                self.channels.remove(channel);
            }

            None => self.channels.clear(),
        }
    }

    pub fn is_listening(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    // -- counters ----------------------------------------------------------

    pub fn queries_executed(&self) -> u64 {
        self.queries_executed
    }

    pub(crate) fn record_query(&mut self) {
        self.queries_executed += 1;
    }
}

// Manual impl so the backend secret can never leak through debug logging.
impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("backend_pid", &self.backend_pid)
            .field("protocol_version", &self.protocol_version)
            .field("authenticated", &self.authenticated)
            .field("transaction_status", &self.transaction_status)
            .field("savepoints", &self.savepoints)
            .field("queries_executed", &self.queries_executed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_distinguishes_empty_parameter_values_from_absent_keys() {
        let mut state = SessionState::new(1, 2);

        assert_eq!(state.parameter("application_name"), None);

        state.set_parameter("application_name", "");

        assert_eq!(state.parameter("application_name"), Some(""));
    }

    #[test]
    fn it_replaces_savepoints_on_name_reuse() {
        let mut state = SessionState::new(1, 2);

        state.define_savepoint("a");
        state.define_savepoint("b");
        state.define_savepoint("c");
        state.define_savepoint("b");

        assert_eq!(state.savepoints(), ["a", "b"]);
    }

    #[test]
    fn it_rolls_back_to_a_savepoint_keeping_it() {
        let mut state = SessionState::new(1, 2);

        state.define_savepoint("a");
        state.define_savepoint("b");
        state.define_savepoint("c");

        assert!(state.rollback_to_savepoint("b"));
        assert_eq!(state.savepoints(), ["a", "b"]);

        assert!(!state.rollback_to_savepoint("zzz"));
    }

    #[test]
    fn it_releases_a_savepoint_and_everything_above() {
        let mut state = SessionState::new(1, 2);

        state.define_savepoint("a");
        state.define_savepoint("b");
        state.define_savepoint("c");

        assert!(state.release_savepoint("b"));
        assert_eq!(state.savepoints(), ["a"]);
    }

    #[test]
    fn it_clears_only_unnamed_on_sync() {
        let mut state = SessionState::new(1, 2);

        state.put_statement(
            UNNAMED,
            PreparedStatement {
                query: "SELECT 1".into(),
                param_types: vec![],
            },
        );
        state.put_statement(
            "s1",
            PreparedStatement {
                query: "SELECT 2".into(),
                param_types: vec![],
            },
        );

        state.clear_unnamed();

        assert!(state.statement(UNNAMED).is_none());
        assert!(state.statement("s1").is_some());
    }

    #[test]
    fn it_does_not_leak_the_secret_through_debug() {
        let state = SessionState::new(7, 0xDEAD_BEEF);
        let formatted = format!("{state:?}");

        assert!(!formatted.contains("3735928559"));
        assert!(!formatted.to_lowercase().contains("deadbeef"));
    }
}
