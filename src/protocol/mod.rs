//! Postgres message protocol.
//!
//! All communication is through a stream of messages.
//!
//! The first byte of a message identifies the message type, and the next
//! four bytes specify the length of the rest of the message (this length
//! count includes itself, but not the message-type byte). The remaining
//! contents of the message are determined by the message type.
//!
//! The only exceptions are the startup and cancel request packets, which
//! have no message-type byte.
//!
//! <https://www.postgresql.org/docs/current/protocol.html>
pub mod backend;
pub mod frontend;

mod error;

pub use error::{ProtocolError, ServerError, Severity};

/// Postgres object identifier.
pub type Oid = u32;

/// Wire format of a single value.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PgFormat {
    #[default]
    Text,
    Binary,
}

impl PgFormat {
    pub fn format_code(self) -> i16 {
        match self {
            Self::Text => 0,
            Self::Binary => 1,
        }
    }

    pub(crate) fn from_code(code: i16) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Text),
            1 => Ok(Self::Binary),
            _ => Err(ProtocolError::invalid(format!("unknown format code {code}"))),
        }
    }
}

/// Requested format for result columns.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ResultFormat {
    /// Text for the simple protocol, binary for the extended protocol.
    #[default]
    Default,
    Text,
    Binary,
}

impl ResultFormat {
    pub(crate) fn resolve(self, extended: bool) -> PgFormat {
        match self {
            Self::Text => PgFormat::Text,
            Self::Binary => PgFormat::Binary,
            Self::Default if extended => PgFormat::Binary,
            Self::Default => PgFormat::Text,
        }
    }
}

/// Human readable name of a backend message type.
pub(crate) fn message_name(tag: u8) -> &'static str {
    match tag {
        b'R' => "Authentication",
        b'K' => "BackendKeyData",
        b'2' => "BindComplete",
        b'3' => "CloseComplete",
        b'C' => "CommandComplete",
        b'D' => "DataRow",
        b'I' => "EmptyQueryResponse",
        b'E' => "ErrorResponse",
        b'V' => "FunctionCallResponse",
        b'v' => "NegotiateProtocolVersion",
        b'n' => "NoData",
        b'N' => "NoticeResponse",
        b'A' => "NotificationResponse",
        b't' => "ParameterDescription",
        b'S' => "ParameterStatus",
        b'1' => "ParseComplete",
        b's' => "PortalSuspended",
        b'Z' => "ReadyForQuery",
        b'T' => "RowDescription",
        b'd' => "CopyData",
        b'c' => "CopyDone",
        b'G' => "CopyInResponse",
        b'H' => "CopyOutResponse",
        b'W' => "CopyBothResponse",
        _ => "Unknown",
    }
}
