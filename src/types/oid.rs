//! Builtin type oids from `pg_type.dat`.
#![allow(dead_code)]

use crate::protocol::Oid;

pub const BOOL: Oid = 16;
pub const BYTEA: Oid = 17;
pub const CHAR: Oid = 18;
pub const NAME: Oid = 19;
pub const INT8: Oid = 20;
pub const INT2: Oid = 21;
pub const INT2VECTOR: Oid = 22;
pub const INT4: Oid = 23;
pub const REGPROC: Oid = 24;
pub const TEXT: Oid = 25;
pub const OID: Oid = 26;
pub const TID: Oid = 27;
pub const XID: Oid = 28;
pub const CID: Oid = 29;
pub const OIDVECTOR: Oid = 30;
pub const JSON: Oid = 114;
pub const XML: Oid = 142;
pub const CIDR: Oid = 650;
pub const FLOAT4: Oid = 700;
pub const FLOAT8: Oid = 701;
pub const UNKNOWN: Oid = 705;
pub const INET: Oid = 869;
pub const BPCHAR: Oid = 1042;
pub const VARCHAR: Oid = 1043;
pub const DATE: Oid = 1082;
pub const TIME: Oid = 1083;
pub const TIMESTAMP: Oid = 1114;
pub const TIMESTAMPTZ: Oid = 1184;
pub const INTERVAL: Oid = 1186;
pub const TIMETZ: Oid = 1266;
pub const NUMERIC: Oid = 1700;
pub const UUID: Oid = 2950;
pub const JSONB: Oid = 3802;

pub const BOOL_ARRAY: Oid = 1000;
pub const BYTEA_ARRAY: Oid = 1001;
pub const CHAR_ARRAY: Oid = 1002;
pub const NAME_ARRAY: Oid = 1003;
pub const INT2_ARRAY: Oid = 1005;
pub const INT2VECTOR_ARRAY: Oid = 1006;
pub const INT4_ARRAY: Oid = 1007;
pub const REGPROC_ARRAY: Oid = 1008;
pub const TEXT_ARRAY: Oid = 1009;
pub const TID_ARRAY: Oid = 1010;
pub const XID_ARRAY: Oid = 1011;
pub const CID_ARRAY: Oid = 1012;
pub const OIDVECTOR_ARRAY: Oid = 1013;
pub const BPCHAR_ARRAY: Oid = 1014;
pub const VARCHAR_ARRAY: Oid = 1015;
pub const INT8_ARRAY: Oid = 1016;
pub const FLOAT4_ARRAY: Oid = 1021;
pub const FLOAT8_ARRAY: Oid = 1022;
pub const OID_ARRAY: Oid = 1028;
pub const INET_ARRAY: Oid = 1041;
pub const CIDR_ARRAY: Oid = 651;
pub const DATE_ARRAY: Oid = 1182;
pub const TIME_ARRAY: Oid = 1183;
pub const TIMESTAMP_ARRAY: Oid = 1115;
pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
pub const INTERVAL_ARRAY: Oid = 1187;
pub const TIMETZ_ARRAY: Oid = 1270;
pub const NUMERIC_ARRAY: Oid = 1231;
pub const UUID_ARRAY: Oid = 2951;
pub const JSON_ARRAY: Oid = 199;
pub const JSONB_ARRAY: Oid = 3807;
pub const XML_ARRAY: Oid = 143;

pub const INT4RANGE: Oid = 3904;
pub const INT4RANGE_ARRAY: Oid = 3905;
pub const NUMRANGE: Oid = 3906;
pub const NUMRANGE_ARRAY: Oid = 3907;
pub const TSRANGE: Oid = 3908;
pub const TSRANGE_ARRAY: Oid = 3909;
pub const TSTZRANGE: Oid = 3910;
pub const TSTZRANGE_ARRAY: Oid = 3911;
pub const DATERANGE: Oid = 3912;
pub const DATERANGE_ARRAY: Oid = 3913;
pub const INT8RANGE: Oid = 3926;
pub const INT8RANGE_ARRAY: Oid = 3927;

pub const INT4MULTIRANGE: Oid = 4451;
pub const NUMMULTIRANGE: Oid = 4532;
pub const TSMULTIRANGE: Oid = 4533;
pub const TSTZMULTIRANGE: Oid = 4534;
pub const DATEMULTIRANGE: Oid = 4535;
pub const INT8MULTIRANGE: Oid = 4536;
