//! `ErrorResponse` and `NoticeResponse`: the tagged error-field body.
//!
//! <https://www.postgresql.org/docs/current/protocol-error-fields.html>

use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufMutExt, Decode, Encode};
use crate::sqlstate::SqlState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgSeverity {
    Panic,
    Fatal,
    Error,
    Warning,
    Notice,
    Debug,
    Info,
    Log,
}

impl PgSeverity {
    fn as_str(self) -> &'static str {
        match self {
            PgSeverity::Panic => "PANIC",
            PgSeverity::Fatal => "FATAL",
            PgSeverity::Error => "ERROR",
            PgSeverity::Warning => "WARNING",
            PgSeverity::Notice => "NOTICE",
            PgSeverity::Debug => "DEBUG",
            PgSeverity::Info => "INFO",
            PgSeverity::Log => "LOG",
        }
    }

    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, Self::Panic | Self::Fatal | Self::Error)
    }
}

/// The field set shared by `ErrorResponse` and `NoticeResponse`.
///
/// Severity, SQLSTATE, and message are always present; everything else is
/// optional and simply not emitted when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    severity: PgSeverity,
    code: String,
    message: String,

    detail: Option<String>,
    hint: Option<String>,
    position: Option<String>,
    internal_position: Option<String>,
    internal_query: Option<String>,
    where_context: Option<String>,
    schema: Option<String>,
    table: Option<String>,
    column: Option<String>,
    data_type: Option<String>,
    constraint: Option<String>,
    file: Option<String>,
    line: Option<String>,
    routine: Option<String>,
}

impl Notice {
    pub fn new(severity: PgSeverity, code: SqlState, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.as_str().to_owned(),
            message: message.into(),
            detail: None,
            hint: None,
            position: None,
            internal_position: None,
            internal_query: None,
            where_context: None,
            schema: None,
            table: None,
            column: None,
            data_type: None,
            constraint: None,
            file: None,
            line: None,
            routine: None,
        }
    }

    /// An ERROR-severity response.
    pub fn error(code: SqlState, message: impl Into<String>) -> Self {
        Self::new(PgSeverity::Error, code, message)
    }

    /// A FATAL-severity response; the server closes the connection after
    /// sending one of these.
    pub fn fatal(code: SqlState, message: impl Into<String>) -> Self {
        Self::new(PgSeverity::Fatal, code, message)
    }

    /// A NOTICE-severity response, delivered as `NoticeResponse`.
    pub fn notice(code: SqlState, message: impl Into<String>) -> Self {
        Self::new(PgSeverity::Notice, code, message)
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn position(mut self, position: u32) -> Self {
        self.position = Some(position.to_string());
        self
    }

    pub fn where_context(mut self, context: impl Into<String>) -> Self {
        self.where_context = Some(context.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn routine(mut self, routine: impl Into<String>) -> Self {
        self.routine = Some(routine.into());
        self
    }

    pub fn severity(&self) -> PgSeverity {
        self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn get(&self, tag: u8) -> Option<&str> {
        let field = match tag {
            b'S' => return Some(self.severity.as_str()),
            b'C' => return Some(&self.code),
            b'M' => return Some(&self.message),
            b'D' => &self.detail,
            b'H' => &self.hint,
            b'P' => &self.position,
            b'p' => &self.internal_position,
            b'q' => &self.internal_query,
            b'W' => &self.where_context,
            b's' => &self.schema,
            b't' => &self.table,
            b'c' => &self.column,
            b'd' => &self.data_type,
            b'n' => &self.constraint,
            b'F' => &self.file,
            b'L' => &self.line,
            b'R' => &self.routine,
            _ => return None,
        };

        field.as_deref()
    }

    /// Strip the fields that may carry internals (context, file/line,
    /// routine, internal query). Production mode runs every outgoing error
    /// through this.
    pub(crate) fn redact(&mut self) {
        self.detail = None;
        self.internal_position = None;
        self.internal_query = None;
        self.where_context = None;
        self.file = None;
        self.line = None;
        self.routine = None;
    }

    fn encode_fields(&self, buf: &mut Vec<u8>) {
        let optional = [
            (b'D', &self.detail),
            (b'H', &self.hint),
            (b'P', &self.position),
            (b'p', &self.internal_position),
            (b'q', &self.internal_query),
            (b'W', &self.where_context),
            (b's', &self.schema),
            (b't', &self.table),
            (b'c', &self.column),
            (b'd', &self.data_type),
            (b'n', &self.constraint),
            (b'F', &self.file),
            (b'L', &self.line),
            (b'R', &self.routine),
        ];

        buf.push(b'S');
        buf.put_str_nul(self.severity.as_str());

        buf.push(b'C');
        buf.put_str_nul(&self.code);

        buf.push(b'M');
        buf.put_str_nul(&self.message);

        for (tag, value) in optional {
            if let Some(value) = value {
                buf.push(tag);
                buf.put_str_nul(value);
            }
        }

        // a single NUL terminates the field list
        buf.push(0);
    }
}

impl Decode for Notice {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        use crate::io::BufExt;

        let mut severity = None;
        let mut code = None;
        let mut message = None;
        let mut notice = Notice::new(PgSeverity::Error, SqlState::INTERNAL_ERROR, "");

        loop {
            if buf.is_empty() {
                return Err(err_protocol!("unterminated error-field list"));
            }

            let tag = buf[0];
            buf.advance(1);

            if tag == 0 {
                break;
            }

            let value = buf.get_str_nul()?;

            match tag {
                b'S' => {
                    severity = Some(match value.as_str() {
                        "PANIC" => PgSeverity::Panic,
                        "FATAL" => PgSeverity::Fatal,
                        "ERROR" => PgSeverity::Error,
                        "WARNING" => PgSeverity::Warning,
                        "NOTICE" => PgSeverity::Notice,
                        "DEBUG" => PgSeverity::Debug,
                        "INFO" => PgSeverity::Info,
                        "LOG" => PgSeverity::Log,

                        other => {
                            return Err(err_protocol!("unknown severity: {:?}", other));
                        }
                    });
                }

                b'C' => code = Some(value),
                b'M' => message = Some(value),
                b'D' => notice.detail = Some(value),
                b'H' => notice.hint = Some(value),
                b'P' => notice.position = Some(value),
                b'p' => notice.internal_position = Some(value),
                b'q' => notice.internal_query = Some(value),
                b'W' => notice.where_context = Some(value),
                b's' => notice.schema = Some(value),
                b't' => notice.table = Some(value),
                b'c' => notice.column = Some(value),
                b'd' => notice.data_type = Some(value),
                b'n' => notice.constraint = Some(value),
                b'F' => notice.file = Some(value),
                b'L' => notice.line = Some(value),
                b'R' => notice.routine = Some(value),

                // unrecognized fields are ignored for forward compatibility
                _ => {}
            }
        }

        notice.severity = severity.ok_or_else(|| err_protocol!("response without severity"))?;
        notice.code = code.ok_or_else(|| err_protocol!("response without SQLSTATE code"))?;
        notice.message = message.ok_or_else(|| err_protocol!("response without message"))?;

        Ok(notice)
    }
}

/// Backend `ErrorResponse` (`E`).
pub struct ErrorResponse<'a>(pub &'a Notice);

impl Encode for ErrorResponse<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'E');
        buf.put_length_prefixed(|buf| self.0.encode_fields(buf));
    }
}

/// Backend `NoticeResponse` (`N`).
pub struct NoticeResponse<'a>(pub &'a Notice);

impl Encode for NoticeResponse<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'N');
        buf.put_length_prefixed(|buf| self.0.encode_fields(buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_encodes_an_error_response() {
        let notice = Notice::error(SqlState::SYNTAX_ERROR, "syntax error at or near \"SELEC\"")
            .position(1);

        let mut buf = Vec::new();
        ErrorResponse(&notice).encode(&mut buf);

        const EXPECTED: &[u8] =
            b"E\0\0\0\x37SERROR\0C42601\0Msyntax error at or near \"SELEC\"\0P1\0\0";

        assert_eq!(buf, EXPECTED);
    }

    #[test]
    fn it_omits_absent_fields() {
        let notice = Notice::notice(SqlState::ADMIN_SHUTDOWN, "server is shutting down");

        let mut buf = Vec::new();
        NoticeResponse(&notice).encode(&mut buf);

        const EXPECTED: &[u8] = b"N\0\0\0\x2dSNOTICE\0C57P01\0Mserver is shutting down\0\0";

        assert_eq!(buf, EXPECTED);
    }

    #[test]
    fn it_round_trips_through_decode() {
        let original = Notice::error(SqlState::UNDEFINED_TABLE, "relation \"users\" does not exist")
            .detail("the mock server has no relations")
            .hint("expected in a mock")
            .schema("public")
            .table("users");

        let mut buf = Vec::new();
        ErrorResponse(&original).encode(&mut buf);

        // skip tag + length prefix
        let decoded = Notice::decode(Bytes::copy_from_slice(&buf[5..])).unwrap();

        assert_eq!(decoded.severity(), PgSeverity::Error);
        assert_eq!(decoded.code(), "42P01");
        assert_eq!(decoded.message(), original.message());
        assert_eq!(decoded.get(b'D'), Some("the mock server has no relations"));
        assert_eq!(decoded.get(b'H'), Some("expected in a mock"));
        assert_eq!(decoded.get(b's'), Some("public"));
        assert_eq!(decoded.get(b't'), Some("users"));
        assert_eq!(decoded.get(b'F'), None);
    }

    #[test]
    fn it_decodes_a_real_server_response() {
        const DATA: &[u8] =
            b"SNOTICE\0C42710\0Mextension \"uuid-ossp\" already exists, skipping\0Fextension.c\0L1656\0RCreateExtension\0\0";

        let m = Notice::decode(Bytes::from_static(DATA)).unwrap();

        assert_eq!(m.message(), "extension \"uuid-ossp\" already exists, skipping");
        assert_eq!(m.severity(), PgSeverity::Notice);
        assert_eq!(m.code(), "42710");
    }

    #[test]
    fn it_redacts_internals() {
        let mut notice = Notice::error(SqlState::INTERNAL_ERROR, "unexpected")
            .detail("stack: <...>")
            .where_context("while parsing")
            .routine("exec_simple_query");

        notice.redact();

        let mut buf = Vec::new();
        ErrorResponse(&notice).encode(&mut buf);

        const EXPECTED: &[u8] = b"E\0\0\0\x1fSERROR\0CXX000\0Munexpected\0\0";

        assert_eq!(buf, EXPECTED);
    }
}
