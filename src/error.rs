use std::backtrace::Backtrace;

use crate::{
    common::unit_error,
    encode::EncodeError,
    protocol::{ProtocolError, ServerError},
    types::DecodeError,
};

/// A type alias for `Result<T, postwire::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

unit_error! {
    /// Required authentication method is not supported.
    pub struct UnsupportedAuth("unsupported authentication method");
}

unit_error! {
    /// Session `client_encoding` is not utf8.
    pub struct UnsupportedEncoding("only the UTF8 client encoding is supported");
}

/// All possible errors from this library.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The byte stream violates the message protocol.
    Protocol(ProtocolError),
    /// A value cannot be decoded from its wire representation.
    Decode(DecodeError),
    /// A query cannot be encoded.
    Encode(EncodeError),
    /// The server reported a fatal error.
    Server(Box<ServerError>),
    UnsupportedAuth(UnsupportedAuth),
    UnsupportedEncoding(UnsupportedEncoding),
}

/// An error from this library.
pub struct Error {
    kind: ErrorKind,
    backtrace: Backtrace,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, backtrace: Backtrace::capture() }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }
}

macro_rules! from {
    ($variant:ident: $err:ty) => {
        impl From<$err> for Error {
            fn from(err: $err) -> Self {
                Self::new(ErrorKind::$variant(err.into()))
            }
        }
    };
}

from!(Protocol: ProtocolError);
from!(Decode: DecodeError);
from!(Encode: EncodeError);
from!(Server: ServerError);
from!(Server: Box<ServerError>);
from!(UnsupportedAuth: UnsupportedAuth);
from!(UnsupportedEncoding: UnsupportedEncoding);

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Protocol(err) => Some(err),
            ErrorKind::Decode(err) => Some(err),
            ErrorKind::Encode(err) => Some(err),
            ErrorKind::Server(err) => Some(err.as_ref()),
            ErrorKind::UnsupportedAuth(err) => Some(err),
            ErrorKind::UnsupportedEncoding(err) => Some(err),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ErrorKind::Protocol(err) => err.fmt(f),
            ErrorKind::Decode(err) => err.fmt(f),
            ErrorKind::Encode(err) => err.fmt(f),
            ErrorKind::Server(err) => err.fmt(f),
            ErrorKind::UnsupportedAuth(err) => err.fmt(f),
            ErrorKind::UnsupportedEncoding(err) => err.fmt(f),
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            write!(f, "\n{}", self.backtrace)?;
        }
        Ok(())
    }
}
