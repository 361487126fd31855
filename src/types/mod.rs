//! Decoding of postgres values in both wire formats.
//!
//! Every builtin type registered here decodes from its text and binary
//! representation into a [`Value`]. Types without a registered codec fall
//! back to utf8 text or raw bytes.
pub mod oid;

mod array;
mod hstore;
mod network;
mod range;
mod text;

pub(crate) mod datetime;
pub(crate) mod numeric;

pub use datetime::Interval;
pub use network::{Cidr, Inet};
pub use numeric::Numeric;
pub use range::RangeValue;

use std::str::Utf8Error;

use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::protocol::Oid;

/// A single decoded postgres value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    /// `oid`, `xid` and `cid` columns.
    Uint4(u32),
    Float4(f32),
    Float8(f64),
    Numeric(Numeric),
    Text(String),
    Bytea(Vec<u8>),
    Date(Date),
    Time(Time),
    TimeTz { time: Time, offset: UtcOffset },
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
    Interval(Interval),
    Uuid(uuid::Uuid),
    Inet(Inet),
    Cidr(Cidr),
    Json(serde_json::Value),
    Tid { block: u32, offset: u16 },
    /// `hstore` pairs in wire order, registered per connection.
    Hstore(Vec<(String, Option<String>)>),
    Array(Vec<Value>),
    Range(Box<RangeValue>),
    Multirange(Vec<RangeValue>),
}

/// An error while decoding a value from its wire representation.
#[derive(Debug)]
pub enum DecodeError {
    /// The value length does not match the type layout.
    InvalidLength { r#type: &'static str, len: usize },
    /// The value content is malformed for the type.
    Invalid { r#type: &'static str },
    /// The decoded value does not fit the client side representation.
    OutOfRange { r#type: &'static str },
    NonUtf8(Utf8Error),
    Json(serde_json::Error),
}

impl DecodeError {
    pub(crate) fn invalid(r#type: &'static str) -> Self {
        Self::Invalid { r#type }
    }

    pub(crate) fn length(r#type: &'static str, len: usize) -> Self {
        Self::InvalidLength { r#type, len }
    }

    pub(crate) fn out_of_range(r#type: &'static str) -> Self {
        Self::OutOfRange { r#type }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NonUtf8(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength { r#type, len } => {
                write!(f, "invalid length {len} for {type} value")
            }
            Self::Invalid { r#type } => write!(f, "invalid value for {type} type"),
            Self::OutOfRange { r#type } => write!(f, "{type} value out of client range"),
            Self::NonUtf8(err) => write!(f, "non utf8 value: {err}"),
            Self::Json(err) => write!(f, "invalid json value: {err}"),
        }
    }
}

impl From<Utf8Error> for DecodeError {
    fn from(err: Utf8Error) -> Self {
        Self::NonUtf8(err)
    }
}

/// Session state which affects value decoding.
#[derive(Clone, Debug, Default)]
pub struct DecodeContext {
    /// `DateStyle` starts with `ISO`.
    pub iso_dates: bool,
    /// `IntervalStyle` is `postgres`.
    pub postgres_intervals: bool,
    /// Fixed utc offset of the session `TimeZone`, when resolvable.
    pub tz_offset: Option<UtcOffset>,
}

/// Decode one non-null value from its wire representation.
pub type Decoder = fn(&DecodeContext, &[u8]) -> Result<Value, DecodeError>;

/// Passthrough decoder for raw results, utf8 text or raw bytes.
pub(crate) fn raw_decoder(format: crate::protocol::PgFormat) -> Decoder {
    match format {
        crate::protocol::PgFormat::Text => text::text_text,
        crate::protocol::PgFormat::Binary => text::bytes_bin,
    }
}

/// Decoders for the `hstore` extension type.
///
/// `hstore` gets its oid at install time, look it up in `pg_type` and
/// register the pair through
/// [`register_decoders`][crate::Connection::register_decoders].
pub fn hstore_decoders() -> (Decoder, Decoder) {
    (hstore::hstore_text, hstore::hstore_bin)
}

/// Text and binary decoders for a type oid.
///
/// Unregistered oids decode as utf8 text and raw bytes.
pub(crate) fn decoders(type_oid: Oid) -> (Decoder, Decoder) {
    macro_rules! array_of {
        ($oid:expr, $elem_text:expr, $elem_bin:expr) => {
            (
                |ctx: &DecodeContext, buf: &[u8]| array::decode_text(ctx, buf, b',', $elem_text),
                |ctx: &DecodeContext, buf: &[u8]| array::decode_bin(ctx, buf, $oid, $elem_bin),
            )
        };
    }
    macro_rules! range_of {
        ($elem_text:expr, $elem_bin:expr) => {
            (
                |ctx: &DecodeContext, buf: &[u8]| range::range_text(ctx, buf, $elem_text),
                |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, $elem_bin),
            )
        };
    }
    macro_rules! multirange_of {
        ($elem_text:expr, $elem_bin:expr) => {
            (
                |ctx: &DecodeContext, buf: &[u8]| range::multirange_text(ctx, buf, $elem_text),
                |ctx: &DecodeContext, buf: &[u8]| range::multirange_bin(ctx, buf, $elem_bin),
            )
        };
    }

    match type_oid {
        oid::BOOL => (numeric::bool_text, numeric::bool_bin),
        oid::BYTEA => (text::bytea_text, text::bytes_bin),
        oid::INT2 => (numeric::int2_text, numeric::int2_bin),
        oid::INT4 => (numeric::int4_text, numeric::int4_bin),
        oid::INT8 => (numeric::int8_text, numeric::int8_bin),
        oid::OID | oid::XID | oid::CID | oid::REGPROC => (numeric::uint4_text, numeric::uint4_bin),
        oid::TID => (numeric::tid_text, numeric::tid_bin),
        oid::FLOAT4 => (numeric::float4_text, numeric::float4_bin),
        oid::FLOAT8 => (numeric::float8_text, numeric::float8_bin),
        oid::NUMERIC => (numeric::numeric_text, numeric::numeric_bin),
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::CHAR | oid::XML
        | oid::UNKNOWN => (text::text_text, text::text_text),
        oid::DATE => (datetime::date_text, datetime::date_bin),
        oid::TIME => (datetime::time_text, datetime::time_bin),
        oid::TIMETZ => (datetime::timetz_text, datetime::timetz_bin),
        oid::TIMESTAMP => (datetime::timestamp_text, datetime::timestamp_bin),
        oid::TIMESTAMPTZ => (datetime::timestamptz_text, datetime::timestamptz_bin),
        oid::INTERVAL => (datetime::interval_text, datetime::interval_bin),
        oid::INET => (network::inet_text, network::inet_bin),
        oid::CIDR => (network::cidr_text, network::cidr_bin),
        oid::UUID => (text::uuid_text, text::uuid_bin),
        oid::JSON => (text::json_text, text::json_text),
        oid::JSONB => (text::json_text, text::jsonb_bin),

        oid::BOOL_ARRAY => array_of!(oid::BOOL, numeric::bool_text, numeric::bool_bin),
        oid::BYTEA_ARRAY => array_of!(oid::BYTEA, text::bytea_text, text::bytes_bin),
        oid::INT2_ARRAY => array_of!(oid::INT2, numeric::int2_text, numeric::int2_bin),
        oid::INT4_ARRAY => array_of!(oid::INT4, numeric::int4_text, numeric::int4_bin),
        oid::INT8_ARRAY => array_of!(oid::INT8, numeric::int8_text, numeric::int8_bin),
        oid::OID_ARRAY => array_of!(oid::OID, numeric::uint4_text, numeric::uint4_bin),
        oid::XID_ARRAY => array_of!(oid::XID, numeric::uint4_text, numeric::uint4_bin),
        oid::CID_ARRAY => array_of!(oid::CID, numeric::uint4_text, numeric::uint4_bin),
        oid::REGPROC_ARRAY => array_of!(oid::REGPROC, numeric::uint4_text, numeric::uint4_bin),
        oid::TID_ARRAY => array_of!(oid::TID, numeric::tid_text, numeric::tid_bin),
        oid::FLOAT4_ARRAY => array_of!(oid::FLOAT4, numeric::float4_text, numeric::float4_bin),
        oid::FLOAT8_ARRAY => array_of!(oid::FLOAT8, numeric::float8_text, numeric::float8_bin),
        oid::NUMERIC_ARRAY => array_of!(oid::NUMERIC, numeric::numeric_text, numeric::numeric_bin),
        oid::TEXT_ARRAY => array_of!(oid::TEXT, text::text_text, text::text_text),
        oid::VARCHAR_ARRAY => array_of!(oid::VARCHAR, text::text_text, text::text_text),
        oid::BPCHAR_ARRAY => array_of!(oid::BPCHAR, text::text_text, text::text_text),
        oid::NAME_ARRAY => array_of!(oid::NAME, text::text_text, text::text_text),
        oid::CHAR_ARRAY => array_of!(oid::CHAR, text::text_text, text::text_text),
        oid::XML_ARRAY => array_of!(oid::XML, text::text_text, text::text_text),
        oid::DATE_ARRAY => array_of!(oid::DATE, datetime::date_text, datetime::date_bin),
        oid::TIME_ARRAY => array_of!(oid::TIME, datetime::time_text, datetime::time_bin),
        oid::TIMETZ_ARRAY => array_of!(oid::TIMETZ, datetime::timetz_text, datetime::timetz_bin),
        oid::TIMESTAMP_ARRAY => {
            array_of!(oid::TIMESTAMP, datetime::timestamp_text, datetime::timestamp_bin)
        }
        oid::TIMESTAMPTZ_ARRAY => {
            array_of!(oid::TIMESTAMPTZ, datetime::timestamptz_text, datetime::timestamptz_bin)
        }
        oid::INTERVAL_ARRAY => {
            array_of!(oid::INTERVAL, datetime::interval_text, datetime::interval_bin)
        }
        oid::INET_ARRAY => array_of!(oid::INET, network::inet_text, network::inet_bin),
        oid::CIDR_ARRAY => array_of!(oid::CIDR, network::cidr_text, network::cidr_bin),
        oid::UUID_ARRAY => array_of!(oid::UUID, text::uuid_text, text::uuid_bin),
        oid::JSON_ARRAY => array_of!(oid::JSON, text::json_text, text::json_text),
        oid::JSONB_ARRAY => array_of!(oid::JSONB, text::json_text, text::jsonb_bin),

        oid::INT4RANGE => range_of!(numeric::int4_text, numeric::int4_bin),
        oid::INT8RANGE => range_of!(numeric::int8_text, numeric::int8_bin),
        oid::NUMRANGE => range_of!(numeric::numeric_text, numeric::numeric_bin),
        oid::DATERANGE => range_of!(datetime::date_text, datetime::date_bin),
        oid::TSRANGE => range_of!(datetime::timestamp_text, datetime::timestamp_bin),
        oid::TSTZRANGE => range_of!(datetime::timestamptz_text, datetime::timestamptz_bin),
        oid::INT4RANGE_ARRAY => array_of!(
            oid::INT4RANGE,
            |ctx: &DecodeContext, buf: &[u8]| range::range_text(ctx, buf, numeric::int4_text),
            |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, numeric::int4_bin)
        ),
        oid::INT8RANGE_ARRAY => array_of!(
            oid::INT8RANGE,
            |ctx: &DecodeContext, buf: &[u8]| range::range_text(ctx, buf, numeric::int8_text),
            |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, numeric::int8_bin)
        ),
        oid::NUMRANGE_ARRAY => array_of!(
            oid::NUMRANGE,
            |ctx: &DecodeContext, buf: &[u8]| range::range_text(ctx, buf, numeric::numeric_text),
            |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, numeric::numeric_bin)
        ),
        oid::DATERANGE_ARRAY => array_of!(
            oid::DATERANGE,
            |ctx: &DecodeContext, buf: &[u8]| range::range_text(ctx, buf, datetime::date_text),
            |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, datetime::date_bin)
        ),
        oid::TSRANGE_ARRAY => array_of!(
            oid::TSRANGE,
            |ctx: &DecodeContext, buf: &[u8]| range::range_text(ctx, buf, datetime::timestamp_text),
            |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, datetime::timestamp_bin)
        ),
        oid::TSTZRANGE_ARRAY => array_of!(
            oid::TSTZRANGE,
            |ctx: &DecodeContext, buf: &[u8]| {
                range::range_text(ctx, buf, datetime::timestamptz_text)
            },
            |ctx: &DecodeContext, buf: &[u8]| range::range_bin(ctx, buf, datetime::timestamptz_bin)
        ),

        oid::INT4MULTIRANGE => multirange_of!(numeric::int4_text, numeric::int4_bin),
        oid::INT8MULTIRANGE => multirange_of!(numeric::int8_text, numeric::int8_bin),
        oid::NUMMULTIRANGE => multirange_of!(numeric::numeric_text, numeric::numeric_bin),
        oid::DATEMULTIRANGE => multirange_of!(datetime::date_text, datetime::date_bin),
        oid::TSMULTIRANGE => multirange_of!(datetime::timestamp_text, datetime::timestamp_bin),
        oid::TSTZMULTIRANGE => {
            multirange_of!(datetime::timestamptz_text, datetime::timestamptz_bin)
        }

        _ => (text::text_text, text::bytes_bin),
    }
}

/// Read a fixed width slice, the whole value must be consumed.
pub(crate) fn exact<const N: usize>(
    r#type: &'static str,
    buf: &[u8],
) -> Result<[u8; N], DecodeError> {
    buf.try_into().map_err(|_| DecodeError::length(r#type, buf.len()))
}

/// The value as utf8, most text codecs start here.
pub(crate) fn utf8(buf: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(buf)?)
}
