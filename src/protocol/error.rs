use bytes::Bytes;
use std::str::Utf8Error;

use crate::{common::ByteStr, ext::BytesExt, protocol::message_name};

/// An error when translating the postgres message protocol.
pub struct ProtocolError {
    kind: ProtocolErrorKind,
}

enum ProtocolErrorKind {
    Unknown {
        msgtype: u8,
    },
    Unexpected {
        found: u8,
        phase: &'static str,
    },
    NegativeLength {
        len: i32,
    },
    Truncated {
        msgtype: u8,
    },
    Trailing {
        msgtype: u8,
    },
    MissingNul {
        msgtype: u8,
    },
    NonUtf8(Utf8Error),
    Invalid {
        reason: Box<str>,
    },
}

impl ProtocolError {
    pub(crate) fn unknown(msgtype: u8) -> Self {
        Self { kind: ProtocolErrorKind::Unknown { msgtype } }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> Self {
        Self { kind: ProtocolErrorKind::Unexpected { found, phase } }
    }

    pub(crate) fn negative_length(len: i32) -> Self {
        Self { kind: ProtocolErrorKind::NegativeLength { len } }
    }

    pub(crate) fn truncated(msgtype: u8) -> Self {
        Self { kind: ProtocolErrorKind::Truncated { msgtype } }
    }

    pub(crate) fn trailing(msgtype: u8) -> Self {
        Self { kind: ProtocolErrorKind::Trailing { msgtype } }
    }

    pub(crate) fn missing_nul(msgtype: u8) -> Self {
        Self { kind: ProtocolErrorKind::MissingNul { msgtype } }
    }

    pub(crate) fn non_utf8(err: Utf8Error) -> Self {
        Self { kind: ProtocolErrorKind::NonUtf8(err) }
    }

    pub(crate) fn invalid(reason: impl Into<Box<str>>) -> Self {
        Self { kind: ProtocolErrorKind::Invalid { reason: reason.into() } }
    }
}

impl std::error::Error for ProtocolError { }

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ProtocolErrorKind::*;
        match &self.kind {
            Unknown { msgtype } => write!(f, "unknown message type {:?}", *msgtype as char),
            Unexpected { found, phase } => {
                write!(f, "unexpected message {} in {} phase", message_name(*found), phase)
            }
            NegativeLength { len } => write!(f, "negative message length {len}"),
            Truncated { msgtype } => {
                write!(f, "message {} shorter than declared", message_name(*msgtype))
            }
            Trailing { msgtype } => {
                write!(f, "message {} has trailing bytes", message_name(*msgtype))
            }
            MissingNul { msgtype } => {
                write!(f, "missing nul terminator in message {}", message_name(*msgtype))
            }
            NonUtf8(err) => write!(f, "non utf8 string: {err}"),
            Invalid { reason } => f.write_str(reason),
        }
    }
}

impl std::fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProtocolError({self})")
    }
}

/// Error severity reported by the server.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Error,
    Fatal,
    Panic,
    Warning,
    Notice,
    Debug,
    Info,
    Log,
}

impl Severity {
    fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            "PANIC" => Self::Panic,
            "WARNING" => Self::Warning,
            "NOTICE" => Self::Notice,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "LOG" => Self::Log,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Log => "LOG",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by the server via `ErrorResponse`.
#[derive(Clone, Debug)]
pub struct ServerError {
    pub severity: Severity,
    pub code: ByteStr,
    pub message: ByteStr,
    pub detail: Option<ByteStr>,
    pub hint: Option<ByteStr>,
    pub position: Option<ByteStr>,
    pub internal_position: Option<ByteStr>,
    pub internal_query: Option<ByteStr>,
    pub where_: Option<ByteStr>,
    pub schema_name: Option<ByteStr>,
    pub table_name: Option<ByteStr>,
    pub column_name: Option<ByteStr>,
    pub data_type_name: Option<ByteStr>,
    pub constraint_name: Option<ByteStr>,
    pub file_name: Option<ByteStr>,
    pub line_number: Option<ByteStr>,
    pub routine_name: Option<ByteStr>,
}

impl ServerError {
    /// Whether this error closes the connection regardless of the protocol flow.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, Severity::Fatal | Severity::Panic)
    }

    /// Parse the field list shared by `ErrorResponse` and `NoticeResponse`.
    pub(crate) fn parse(mut body: Bytes, msgtype: u8) -> Result<Self, ProtocolError> {
        let mut severity = None;
        let mut localized_severity = None;
        let mut code = None;
        let mut message = None;
        let mut detail = None;
        let mut hint = None;
        let mut position = None;
        let mut internal_position = None;
        let mut internal_query = None;
        let mut where_ = None;
        let mut schema_name = None;
        let mut table_name = None;
        let mut column_name = None;
        let mut data_type_name = None;
        let mut constraint_name = None;
        let mut file_name = None;
        let mut line_number = None;
        let mut routine_name = None;

        loop {
            use bytes::Buf;
            let Some(&field) = body.first() else {
                return Err(ProtocolError::truncated(msgtype));
            };
            body.advance(1);
            if field == 0 {
                break;
            }
            let value = body.get_nul_bytestr(msgtype)?;
            match field {
                b'S' => localized_severity = Some(value),
                b'V' => severity = Some(value),
                b'C' => code = Some(value),
                b'M' => message = Some(value),
                b'D' => detail = Some(value),
                b'H' => hint = Some(value),
                b'P' => position = Some(value),
                b'p' => internal_position = Some(value),
                b'q' => internal_query = Some(value),
                b'W' => where_ = Some(value),
                b's' => schema_name = Some(value),
                b't' => table_name = Some(value),
                b'c' => column_name = Some(value),
                b'd' => data_type_name = Some(value),
                b'n' => constraint_name = Some(value),
                b'F' => file_name = Some(value),
                b'L' => line_number = Some(value),
                b'R' => routine_name = Some(value),
                // unrecognized fields are ignored per protocol docs
                _ => {}
            }
        }

        if !body.is_empty() {
            return Err(ProtocolError::trailing(msgtype));
        }

        // pre 9.6 servers only report the localized `S` field
        let severity = severity
            .or(localized_severity)
            .and_then(|e| Severity::from_str(&e))
            .ok_or_else(|| ProtocolError::invalid("error response without severity field"))?;

        Ok(Self {
            severity,
            code: code.ok_or_else(|| ProtocolError::invalid("error response without code field"))?,
            message: message
                .ok_or_else(|| ProtocolError::invalid("error response without message field"))?,
            detail,
            hint,
            position,
            internal_position,
            internal_query,
            where_,
            schema_name,
            table_name,
            column_name,
            data_type_name,
            constraint_name,
            file_name,
            line_number,
            routine_name,
        })
    }
}

impl std::error::Error for ServerError { }

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)
    }
}
