//! Messages sent by the frontend.
use bytes::{BufMut, BytesMut};

use crate::{
    encode::Encoded,
    ext::{BufMutExt, StrExt, UsizeExt},
    protocol::{Oid, PgFormat},
};

/// Tag byte plus the length field.
const PREFIX: usize = 1 + 4;

/// Postgres protocol version 3.0.
const PROTOCOL_VERSION: i32 = 196_608;
const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// An encodable frontend message.
pub trait FrontendProtocol {
    const MSGTYPE: u8;

    /// The size of the message body.
    fn size_hint(&self) -> usize;

    /// Encode the message body.
    ///
    /// The implementor must write the exact amount of bytes as [`size_hint`][FrontendProtocol::size_hint].
    fn encode(&self, buf: &mut BytesMut);
}

/// Write a frontend message with the message prefix.
pub fn write<F: FrontendProtocol>(message: F, buf: &mut BytesMut) {
    let size = message.size_hint();
    buf.reserve(PREFIX + size);
    buf.put_u8(F::MSGTYPE);
    buf.put_u32((size + 4).to_u32());
    let offset = buf.len();
    message.encode(buf);
    debug_assert_eq!(buf.len() - offset, size, "encode wrote a different size than size_hint");
}

/// Run a simple query cycle.
pub struct Query<'a> {
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> usize {
        self.sql.nul_string_len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Parse a statement, empty `name` for the unnamed statement.
pub struct Parse<'a> {
    pub name: &'a str,
    pub sql: &'a str,
    pub param_oids: &'a [Oid],
}

impl FrontendProtocol for Parse<'_> {
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> usize {
        self.name.nul_string_len() + self.sql.nul_string_len() + 2 + 4 * self.param_oids.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_nul_string(self.name);
        buf.put_nul_string(self.sql);
        buf.put_u16(self.param_oids.len().to_u16());
        for oid in self.param_oids {
            buf.put_u32(*oid);
        }
    }
}

/// Bind parameters to a parsed statement, producing a portal.
pub struct Bind<'a> {
    pub portal: &'a str,
    pub name: &'a str,
    pub params: &'a [Encoded<'a>],
    pub result_format: PgFormat,
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> usize {
        self.portal.nul_string_len()
            + self.name.nul_string_len()
            + 2
            + 2 * self.params.len()
            + 2
            + self
                .params
                .iter()
                .map(|param| 4 + param.as_bytes().len())
                .sum::<usize>()
            + 2
            + 2
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_nul_string(self.portal);
        buf.put_nul_string(self.name);
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            buf.put_i16(param.format().format_code());
        }
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            match param.is_null() {
                true => buf.put_i32(-1),
                false => {
                    buf.put_u32(param.as_bytes().len().to_u32());
                    buf.put_slice(param.as_bytes());
                }
            }
        }
        buf.put_u16(1);
        buf.put_i16(self.result_format.format_code());
    }
}

/// Describe a statement (`b'S'`) or portal (`b'P'`).
pub struct Describe<'a> {
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> usize {
        1 + self.name.nul_string_len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// Execute a portal, `0` max rows for all rows.
pub struct Execute<'a> {
    pub portal: &'a str,
    pub max_rows: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> usize {
        self.portal.nul_string_len() + 4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_nul_string(self.portal);
        buf.put_u32(self.max_rows);
    }
}

/// Close a statement (`b'S'`) or portal (`b'P'`).
pub struct Close<'a> {
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn size_hint(&self) -> usize {
        1 + self.name.nul_string_len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

macro_rules! unit_msg {
    ($(#[$meta:meta])* $name:ident = $tag:literal) => {
        $(#[$meta])*
        pub struct $name;

        impl FrontendProtocol for $name {
            const MSGTYPE: u8 = $tag;

            fn size_hint(&self) -> usize {
                0
            }

            fn encode(&self, _: &mut BytesMut) { }
        }
    };
}

unit_msg!(
    /// Close the current extended query cycle.
    Sync = b'S'
);
unit_msg!(
    /// Ask the server to flush its output buffer.
    Flush = b'H'
);
unit_msg!(
    /// Close the connection.
    Terminate = b'X'
);

/// Cleartext or md5 hashed password.
pub struct PasswordMessage<'a> {
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> usize {
        self.password.nul_string_len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_nul_string(self.password);
    }
}

/// The startup packet, sent first and without a message tag.
pub struct Startup<'a> {
    pub user: &'a str,
    pub database: Option<&'a str>,
    pub application_name: Option<&'a str>,
    pub timezone: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(&self, buf: &mut BytesMut) {
        let mut pairs = vec![
            ("user", self.user),
            ("client_encoding", "UTF8"),
            ("DateStyle", "ISO"),
        ];
        if let Some(database) = self.database {
            pairs.push(("database", database));
        }
        if let Some(name) = self.application_name {
            pairs.push(("application_name", name));
        }
        if let Some(timezone) = self.timezone {
            pairs.push(("TimeZone", timezone));
        }

        let size = 4
            + 4
            + pairs
                .iter()
                .map(|(key, value)| key.nul_string_len() + value.nul_string_len())
                .sum::<usize>()
            + 1;
        buf.reserve(size);
        buf.put_u32(size.to_u32());
        buf.put_i32(PROTOCOL_VERSION);
        for (key, value) in pairs {
            buf.put_nul_string(key);
            buf.put_nul_string(value);
        }
        buf.put_u8(0);
    }
}

/// Cancel a query running on another connection, sent without a tag on
/// a fresh connection.
pub struct CancelRequest {
    pub process_id: i32,
    pub secret_key: i32,
}

impl CancelRequest {
    pub fn write(&self, buf: &mut BytesMut) {
        buf.reserve(16);
        buf.put_u32(16);
        buf.put_i32(CANCEL_REQUEST_CODE);
        buf.put_i32(self.process_id);
        buf.put_i32(self.secret_key);
    }
}
