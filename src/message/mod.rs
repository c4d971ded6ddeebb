//! Wire protocol message definitions and codecs.
//!
//! Frontend (client-to-server) messages implement [`Decode`]; backend
//! (server-to-client) messages implement [`Encode`]. The two tag tables are
//! distinct types: some bytes (`S`, `D`, `C`, `H`) mean different things in
//! different directions and must never share a table.
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>

use bytes::Bytes;

use crate::error::{err_protocol, Error};
use crate::io::Decode;

mod authentication;
mod backend_key_data;
mod bind;
mod bind_complete;
mod close;
mod close_complete;
mod command_complete;
mod data_row;
mod describe;
mod empty_query_response;
mod execute;
mod no_data;
mod notification;
mod parameter_description;
mod parameter_status;
mod parse;
mod parse_complete;
mod password;
mod portal_suspended;
mod query;
mod ready_for_query;
mod response;
mod row_description;
mod startup;

pub use authentication::Authentication;
pub use backend_key_data::BackendKeyData;
pub use bind::Bind;
pub use bind_complete::BindComplete;
pub use close::Close;
pub use close_complete::CloseComplete;
pub use command_complete::CommandComplete;
pub use data_row::DataRow;
pub use describe::Describe;
pub use empty_query_response::EmptyQueryResponse;
pub use execute::Execute;
pub use no_data::NoData;
pub use notification::NotificationResponse;
pub use parameter_description::ParameterDescription;
pub use parameter_status::ParameterStatus;
pub use parse::Parse;
pub use parse_complete::ParseComplete;
pub use password::{SaslInitialResponse, SaslResponse};
pub use portal_suspended::PortalSuspended;
pub use query::Query;
pub use ready_for_query::ReadyForQuery;
pub use response::{ErrorResponse, Notice, NoticeResponse, PgSeverity};
pub use row_description::{Field, RowDescription};
pub use startup::{CancelRequest, Startup, StartupRequest, PROTOCOL_VERSION_3};

/// The tag byte of a typed frontend message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendMessageFormat {
    Bind,
    Close,
    CopyData,
    CopyDone,
    CopyFail,
    Describe,
    Execute,
    Flush,
    FunctionCall,
    Parse,
    /// Also carries `SASLInitialResponse` and `SASLResponse`; which one is
    /// determined by the authentication phase, not by the tag.
    Password,
    Query,
    Sync,
    Terminate,
}

impl FrontendMessageFormat {
    pub(crate) fn try_from_u8(v: u8) -> Result<Self, Error> {
        Ok(match v {
            b'B' => FrontendMessageFormat::Bind,
            b'C' => FrontendMessageFormat::Close,
            b'd' => FrontendMessageFormat::CopyData,
            b'c' => FrontendMessageFormat::CopyDone,
            b'f' => FrontendMessageFormat::CopyFail,
            b'D' => FrontendMessageFormat::Describe,
            b'E' => FrontendMessageFormat::Execute,
            b'H' => FrontendMessageFormat::Flush,
            b'F' => FrontendMessageFormat::FunctionCall,
            b'P' => FrontendMessageFormat::Parse,
            b'p' => FrontendMessageFormat::Password,
            b'Q' => FrontendMessageFormat::Query,
            b'S' => FrontendMessageFormat::Sync,
            b'X' => FrontendMessageFormat::Terminate,

            _ => {
                return Err(err_protocol!(
                    "unknown frontend message type: {:?}",
                    v as char
                ));
            }
        })
    }
}

/// A complete typed frontend message: the tag and the undecoded body.
#[derive(Debug)]
pub struct Message {
    pub format: FrontendMessageFormat,
    pub contents: Bytes,
}

impl Message {
    #[inline]
    pub fn decode<T>(self) -> Result<T, Error>
    where
        T: Decode,
    {
        T::decode(self.contents)
    }
}

#[test]
fn test_frontend_format_round_trip() {
    for tag in [
        b'B', b'C', b'd', b'c', b'f', b'D', b'E', b'H', b'F', b'P', b'p', b'Q', b'S', b'X',
    ] {
        assert!(FrontendMessageFormat::try_from_u8(tag).is_ok());
    }

    // backend-only tags must not decode as frontend messages
    for tag in [b'R', b'K', b'Z', b'T', b'N', b'A', b'1', b'2'] {
        assert!(FrontendMessageFormat::try_from_u8(tag).is_err());
    }
}
