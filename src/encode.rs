//! Query parameter encoding.
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::{
    protocol::{Oid, PgFormat},
    types::{
        datetime::{date_to_pg_days, datetime_to_usecs, time_to_usecs},
        numeric::numeric_to_bin,
        oid, Cidr, Inet, Interval, Numeric,
    },
};

/// An error while encoding a query.
#[derive(Debug)]
pub enum EncodeError {
    /// More parameters than the wire count field can carry.
    TooManyParams(usize),
    /// The statement text exceeds the message length field.
    StatementTooLong,
    /// An encoded message exceeds the message length field.
    MessageTooLong,
    Json(serde_json::Error),
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyParams(len) => write!(f, "too many parameters: {len}"),
            Self::StatementTooLong => f.write_str("statement text too long"),
            Self::MessageTooLong => f.write_str("encoded message too long"),
            Self::Json(err) => write!(f, "cannot serialize json parameter: {err}"),
        }
    }
}

/// A custom parameter type rendered through its postgres text form.
pub trait ToSqlText {
    fn sql_text(&self) -> String;

    /// Parameter type oid, the server infers the type when `None`.
    fn oid(&self) -> Option<Oid> {
        None
    }
}

/// A single query parameter.
#[derive(Clone, Debug)]
pub enum Param<'a> {
    Null,
    Bool(bool),
    /// Sent as `int4` when the value fits, `int8` otherwise.
    Int(i64),
    Float(f64),
    Text(&'a str),
    Bytea(&'a [u8]),
    Numeric(Numeric),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
    Interval(Interval),
    Uuid(uuid::Uuid),
    Inet(Inet),
    Cidr(Cidr),
    Json(&'a serde_json::Value),
    /// Text form of a type without a native variant.
    Unknown { oid: Option<Oid>, text: String },
}

impl<'a> Param<'a> {
    pub fn unknown<T: ToSqlText + ?Sized>(value: &T) -> Param<'static> {
        Param::Unknown { oid: value.oid(), text: value.sql_text() }
    }

    /// The encoded value borrows the input data, not the param itself.
    pub fn encode(&self) -> Result<Encoded<'a>, EncodeError> {
        Ok(match self {
            Param::Null => Encoded {
                value: EncodedValue::Null,
                oid: 0,
                format: PgFormat::Text,
            },
            Param::Bool(b) => inline([*b as u8], oid::BOOL),
            Param::Int(i) => match i32::try_from(*i) {
                Ok(i) => inline(i.to_be_bytes(), oid::INT4),
                Err(_) => inline(i.to_be_bytes(), oid::INT8),
            },
            Param::Float(f) => inline(f.to_be_bytes(), oid::FLOAT8),
            Param::Text(text) => Encoded {
                value: EncodedValue::Slice(text.as_bytes()),
                oid: oid::TEXT,
                format: PgFormat::Text,
            },
            Param::Bytea(bytes) => Encoded {
                value: EncodedValue::Slice(*bytes),
                oid: oid::BYTEA,
                format: PgFormat::Binary,
            },
            Param::Numeric(num) => match numeric_to_bin(num) {
                Some(wire) => Encoded {
                    value: EncodedValue::Owned(wire),
                    oid: oid::NUMERIC,
                    format: PgFormat::Binary,
                },
                // the weight overflows its wire width, let the server parse it
                None => Encoded {
                    value: EncodedValue::Owned(num.to_string().into_bytes()),
                    oid: 0,
                    format: PgFormat::Text,
                },
            },
            Param::Date(date) => inline(date_to_pg_days(*date).to_be_bytes(), oid::DATE),
            Param::Time(time) => inline(time_to_usecs(*time).to_be_bytes(), oid::TIME),
            Param::Timestamp(datetime) => {
                inline(datetime_to_usecs(*datetime).to_be_bytes(), oid::TIMESTAMP)
            }
            Param::TimestampTz(datetime) => {
                let utc = datetime.to_offset(UtcOffset::UTC);
                let naive = PrimitiveDateTime::new(utc.date(), utc.time());
                inline(datetime_to_usecs(naive).to_be_bytes(), oid::TIMESTAMPTZ)
            }
            Param::Interval(interval) => {
                let mut buf = [0u8; 16];
                buf[..8].copy_from_slice(&interval.microseconds.to_be_bytes());
                buf[8..12].copy_from_slice(&interval.days.to_be_bytes());
                buf[12..].copy_from_slice(&interval.months.to_be_bytes());
                inline(buf, oid::INTERVAL)
            }
            Param::Uuid(uuid) => inline(*uuid.as_bytes(), oid::UUID),
            Param::Inet(inet) => Encoded {
                value: EncodedValue::Owned(inet.to_string().into_bytes()),
                oid: oid::INET,
                format: PgFormat::Text,
            },
            Param::Cidr(cidr) => Encoded {
                value: EncodedValue::Owned(cidr.to_string().into_bytes()),
                oid: oid::CIDR,
                format: PgFormat::Text,
            },
            Param::Json(json) => {
                let mut wire = vec![1u8];
                serde_json::to_writer(&mut wire, json).map_err(EncodeError::Json)?;
                Encoded {
                    value: EncodedValue::Owned(wire),
                    oid: oid::JSONB,
                    format: PgFormat::Binary,
                }
            }
            Param::Unknown { oid, text } => Encoded {
                value: EncodedValue::Owned(text.clone().into_bytes()),
                oid: oid.unwrap_or(0),
                format: PgFormat::Text,
            },
        })
    }
}

const INLINE_LEN: usize = 16;

fn inline<const N: usize>(bytes: [u8; N], oid: Oid) -> Encoded<'static> {
    const { assert!(N <= INLINE_LEN) };
    let mut buf = [0u8; INLINE_LEN];
    buf[..N].copy_from_slice(&bytes);
    Encoded {
        value: EncodedValue::Inline { buf, len: N as u8 },
        oid,
        format: PgFormat::Binary,
    }
}

/// A parameter in its wire representation.
pub struct Encoded<'a> {
    value: EncodedValue<'a>,
    oid: Oid,
    format: PgFormat,
}

enum EncodedValue<'a> {
    Null,
    Slice(&'a [u8]),
    Inline { buf: [u8; INLINE_LEN], len: u8 },
    Owned(Vec<u8>),
}

impl Encoded<'_> {
    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn format(&self) -> PgFormat {
        self.format
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, EncodedValue::Null)
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.value {
            EncodedValue::Null => &[],
            EncodedValue::Slice(slice) => slice,
            EncodedValue::Inline { buf, len } => &buf[..*len as usize],
            EncodedValue::Owned(vec) => vec,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn int_widening() {
        let small = Param::Int(7).encode().unwrap();
        assert_eq!(small.oid(), oid::INT4);
        assert_eq!(small.as_bytes(), 7i32.to_be_bytes());
        let negative = Param::Int(-1).encode().unwrap();
        assert_eq!(negative.oid(), oid::INT4);
        let wide = Param::Int(i64::from(i32::MAX) + 1).encode().unwrap();
        assert_eq!(wide.oid(), oid::INT8);
        assert_eq!(wide.as_bytes().len(), 8);
    }

    #[test]
    fn null_param() {
        let null = Param::Null.encode().unwrap();
        assert!(null.is_null());
        assert_eq!(null.oid(), 0);
    }

    #[test]
    fn numeric_param_nan() {
        let nan = Param::Numeric(Numeric::NaN).encode().unwrap();
        assert_eq!(nan.format(), PgFormat::Binary);
        assert_eq!(&nan.as_bytes()[4..6], &[0xC0, 0]);
    }

    #[test]
    fn json_param_version_byte() {
        let json = serde_json::json!({"k": 1});
        let encoded = Param::Json(&json).encode().unwrap();
        assert_eq!(encoded.oid(), oid::JSONB);
        assert_eq!(encoded.as_bytes()[0], 1);
    }

    #[test]
    fn encoded_outlives_param() {
        let text = String::from("owned");
        let encoded = Param::Text(&text).encode().unwrap();
        assert_eq!(encoded.as_bytes(), b"owned");
        let unknown = Param::Unknown { oid: None, text: "4".into() }.encode().unwrap();
        assert_eq!(unknown.as_bytes(), b"4");
        assert_eq!(unknown.oid(), 0);
    }

    #[test]
    fn text_param_stays_text() {
        let text = Param::Text("hi").encode().unwrap();
        assert_eq!(text.format(), PgFormat::Text);
        assert_eq!(text.oid(), oid::TEXT);
        assert_eq!(text.as_bytes(), b"hi");
    }

    #[test]
    fn timestamp_param_epoch() {
        use time::macros::datetime;
        let epoch = Param::Timestamp(datetime!(2000-01-01 00:00)).encode().unwrap();
        assert_eq!(epoch.as_bytes(), 0i64.to_be_bytes());
        let tz = Param::TimestampTz(datetime!(2000-01-01 02:00 +2)).encode().unwrap();
        assert_eq!(tz.as_bytes(), 0i64.to_be_bytes());
    }
}
