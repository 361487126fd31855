//! Messages sent by the backend.
use bytes::{Buf, Bytes};

use crate::{
    common::ByteStr,
    ext::{BufExt, BytesExt},
    protocol::{Oid, PgFormat, ProtocolError, ServerError},
    result::FieldDescriptor,
};

/// A decoded backend message.
pub trait BackendProtocol: Sized {
    const MSGTYPE: u8;

    fn decode(body: Bytes) -> Result<Self, ProtocolError>;
}

macro_rules! match_backend {
    ($tag:ident, $body:ident, [$($name:ident),* $(,)?]) => {
        match $tag {
            $(<$name as BackendProtocol>::MSGTYPE => Self::$name($name::decode($body)?),)*
            _ => return Err(ProtocolError::unknown($tag)),
        }
    };
}

/// All supported backend messages.
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

impl BackendMessage {
    pub fn decode(tag: u8, body: Bytes) -> Result<Self, ProtocolError> {
        Ok(match_backend!(tag, body, [
            Authentication,
            BackendKeyData,
            BindComplete,
            CloseComplete,
            CommandComplete,
            DataRow,
            EmptyQueryResponse,
            ErrorResponse,
            NegotiateProtocolVersion,
            NoData,
            NoticeResponse,
            NotificationResponse,
            ParameterDescription,
            ParameterStatus,
            ParseComplete,
            PortalSuspended,
            ReadyForQuery,
            RowDescription,
        ]))
    }
}

macro_rules! unit_msg {
    ($(#[$meta:meta])* $name:ident = $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name;

        impl BackendProtocol for $name {
            const MSGTYPE: u8 = $tag;

            fn decode(body: Bytes) -> Result<Self, ProtocolError> {
                match body.is_empty() {
                    true => Ok(Self),
                    false => Err(ProtocolError::trailing(Self::MSGTYPE)),
                }
            }
        }
    };
}

unit_msg!(
    /// Parse phase of the extended query completed.
    ParseComplete = b'1'
);
unit_msg!(
    /// Bind phase of the extended query completed.
    BindComplete = b'2'
);
unit_msg!(
    /// A Close request completed.
    CloseComplete = b'3'
);
unit_msg!(
    /// The query string was empty.
    EmptyQueryResponse = b'I'
);
unit_msg!(
    /// The statement returns no rows.
    NoData = b'n'
);
unit_msg!(
    /// An Execute row limit was reached.
    PortalSuspended = b's'
);

/// Authentication request.
#[derive(Debug)]
pub enum Authentication {
    Ok,
    KerberosV5,
    CleartextPassword,
    MD5Password { salt: [u8; 4] },
    GSS,
    GSSContinue { data: Bytes },
    SSPI,
    SASL { mechanisms: Vec<ByteStr> },
    SASLContinue { data: Bytes },
    SASLFinal { data: Bytes },
}

impl BackendProtocol for Authentication {
    const MSGTYPE: u8 = b'R';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let code = body.try_get_i32_(Self::MSGTYPE)?;
        let auth = match code {
            0 => Self::Ok,
            2 => Self::KerberosV5,
            3 => Self::CleartextPassword,
            5 => {
                if body.remaining() != 4 {
                    return Err(ProtocolError::truncated(Self::MSGTYPE));
                }
                let mut salt = [0u8; 4];
                body.copy_to_slice(&mut salt);
                Self::MD5Password { salt }
            }
            7 => Self::GSS,
            8 => return Ok(Self::GSSContinue { data: body }),
            9 => Self::SSPI,
            10 => {
                let mut mechanisms = vec![];
                while body.first().is_some_and(|b| *b != 0) {
                    mechanisms.push(body.get_nul_bytestr(Self::MSGTYPE)?);
                }
                body.advance(1);
                if !body.is_empty() {
                    return Err(ProtocolError::trailing(Self::MSGTYPE));
                }
                return Ok(Self::SASL { mechanisms });
            }
            11 => return Ok(Self::SASLContinue { data: body }),
            12 => return Ok(Self::SASLFinal { data: body }),
            _ => return Err(ProtocolError::invalid(format!("unknown authentication code {code}"))),
        };
        match body.is_empty() {
            true => Ok(auth),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// Cancellation key for this session.
#[derive(Clone, Copy, Debug)]
pub struct BackendKeyData {
    pub process_id: i32,
    pub secret_key: i32,
}

impl BackendProtocol for BackendKeyData {
    const MSGTYPE: u8 = b'K';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let process_id = body.try_get_i32_(Self::MSGTYPE)?;
        let secret_key = body.try_get_i32_(Self::MSGTYPE)?;
        match body.is_empty() {
            true => Ok(Self { process_id, secret_key }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// A statement within the query completed.
#[derive(Debug)]
pub struct CommandComplete {
    pub tag: ByteStr,
}

impl BackendProtocol for CommandComplete {
    const MSGTYPE: u8 = b'C';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let tag = body.get_nul_bytestr(Self::MSGTYPE)?;
        match body.is_empty() {
            true => Ok(Self { tag }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// One result row, values still encoded.
#[derive(Debug)]
pub struct DataRow {
    pub columns: u16,
    pub body: Bytes,
}

impl BackendProtocol for DataRow {
    const MSGTYPE: u8 = b'D';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let columns = body.try_get_u16_(Self::MSGTYPE)?;
        Ok(Self { columns, body })
    }
}

/// The query failed.
#[derive(Debug)]
pub struct ErrorResponse(pub ServerError);

impl BackendProtocol for ErrorResponse {
    const MSGTYPE: u8 = b'E';

    fn decode(body: Bytes) -> Result<Self, ProtocolError> {
        ServerError::parse(body, Self::MSGTYPE).map(Self)
    }
}

/// The server does not support the requested minor protocol version.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    pub minor_version: i32,
    pub unsupported_options: Vec<ByteStr>,
}

impl BackendProtocol for NegotiateProtocolVersion {
    const MSGTYPE: u8 = b'v';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let minor_version = body.try_get_i32_(Self::MSGTYPE)?;
        let count = body.try_get_i32_(Self::MSGTYPE)?;
        let mut unsupported_options = vec![];
        for _ in 0..count.max(0) {
            unsupported_options.push(body.get_nul_bytestr(Self::MSGTYPE)?);
        }
        match body.is_empty() {
            true => Ok(Self { minor_version, unsupported_options }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// A warning or informational message, uses the error field layout.
#[derive(Debug)]
pub struct NoticeResponse(pub ServerError);

impl BackendProtocol for NoticeResponse {
    const MSGTYPE: u8 = b'N';

    fn decode(body: Bytes) -> Result<Self, ProtocolError> {
        ServerError::parse(body, Self::MSGTYPE).map(Self)
    }
}

/// A `NOTIFY` fired on a channel this session listens on.
#[derive(Debug)]
pub struct NotificationResponse {
    pub process_id: i32,
    pub channel: ByteStr,
    pub payload: ByteStr,
}

impl BackendProtocol for NotificationResponse {
    const MSGTYPE: u8 = b'A';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let process_id = body.try_get_i32_(Self::MSGTYPE)?;
        let channel = body.get_nul_bytestr(Self::MSGTYPE)?;
        let payload = body.get_nul_bytestr(Self::MSGTYPE)?;
        match body.is_empty() {
            true => Ok(Self { process_id, channel, payload }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// Parameter types of a described statement.
#[derive(Debug)]
pub struct ParameterDescription {
    pub oids: Vec<Oid>,
}

impl BackendProtocol for ParameterDescription {
    const MSGTYPE: u8 = b't';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let count = body.try_get_i16_(Self::MSGTYPE)?;
        let mut oids = Vec::with_capacity(count.max(0) as _);
        for _ in 0..count.max(0) {
            oids.push(body.try_get_u32_(Self::MSGTYPE)?);
        }
        match body.is_empty() {
            true => Ok(Self { oids }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// A run-time parameter changed, sent at startup and on `SET`.
#[derive(Debug)]
pub struct ParameterStatus {
    pub name: ByteStr,
    pub value: ByteStr,
}

impl BackendProtocol for ParameterStatus {
    const MSGTYPE: u8 = b'S';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let name = body.get_nul_bytestr(Self::MSGTYPE)?;
        let value = body.get_nul_bytestr(Self::MSGTYPE)?;
        match body.is_empty() {
            true => Ok(Self { name, value }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// The server is ready for the next query cycle.
#[derive(Clone, Copy, Debug)]
pub struct ReadyForQuery {
    /// `b'I'` idle, `b'T'` in transaction, `b'E'` in a failed transaction.
    pub status: u8,
}

impl BackendProtocol for ReadyForQuery {
    const MSGTYPE: u8 = b'Z';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let status = body.try_get_u8_(Self::MSGTYPE)?;
        match body.is_empty() {
            true => Ok(Self { status }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

/// Column descriptions of the rows to follow.
#[derive(Debug)]
pub struct RowDescription {
    pub fields: Vec<FieldDescriptor>,
}

impl BackendProtocol for RowDescription {
    const MSGTYPE: u8 = b'T';

    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let count = body.try_get_u16_(Self::MSGTYPE)?;
        let mut fields = Vec::with_capacity(count as _);
        for _ in 0..count {
            let name = body.get_nul_bytestr(Self::MSGTYPE)?;
            let table_oid = body.try_get_u32_(Self::MSGTYPE)?;
            let column_attr = body.try_get_i16_(Self::MSGTYPE)?;
            let type_oid = body.try_get_u32_(Self::MSGTYPE)?;
            let type_size = body.try_get_i16_(Self::MSGTYPE)?;
            let type_modifier = body.try_get_i32_(Self::MSGTYPE)?;
            let format = PgFormat::from_code(body.try_get_i16_(Self::MSGTYPE)?)?;
            fields.push(FieldDescriptor {
                name,
                table_oid,
                column_attr,
                type_oid,
                type_size,
                type_modifier,
                format,
            });
        }
        match body.is_empty() {
            true => Ok(Self { fields }),
            false => Err(ProtocolError::trailing(Self::MSGTYPE)),
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::protocol::Severity;

    #[test]
    fn unit_message_rejects_body() {
        assert!(ParseComplete::decode(Bytes::new()).is_ok());
        assert!(ParseComplete::decode(Bytes::from_static(b"\0")).is_err());
    }

    #[test]
    fn ready_for_query_status() {
        let ok = ReadyForQuery::decode(Bytes::from_static(b"I")).unwrap();
        assert_eq!(ok.status, b'I');
        assert!(ReadyForQuery::decode(Bytes::from_static(b"IT")).is_err());
        assert!(ReadyForQuery::decode(Bytes::new()).is_err());
    }

    #[test]
    fn row_description_fields() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_slice(b"id\0");
        buf.put_u32(0x100);
        buf.put_i16(1);
        buf.put_u32(23);
        buf.put_i16(4);
        buf.put_i32(-1);
        buf.put_i16(1);
        let desc = RowDescription::decode(buf.freeze()).unwrap();
        assert_eq!(desc.fields.len(), 1);
        assert_eq!(desc.fields[0].name, "id");
        assert_eq!(desc.fields[0].type_oid, 23);
        assert_eq!(desc.fields[0].format, PgFormat::Binary);
    }

    #[test]
    fn error_response_fields() {
        let body = Bytes::from_static(
            b"SERROR\0VERROR\0C42P01\0Mrelation \"foo\" does not exist\0P15\0\0",
        );
        let ErrorResponse(err) = ErrorResponse::decode(body).unwrap();
        assert_eq!(err.severity, Severity::Error);
        assert_eq!(err.code, "42P01");
        assert_eq!(err.message, "relation \"foo\" does not exist");
        assert_eq!(err.position.as_deref(), Some("15"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn error_response_requires_code() {
        let body = Bytes::from_static(b"VERROR\0Mboom\0\0");
        assert!(ErrorResponse::decode(body).is_err());
    }

    #[test]
    fn unknown_tag() {
        assert!(BackendMessage::decode(b'?', Bytes::new()).is_err());
    }
}
