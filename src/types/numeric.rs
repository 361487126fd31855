//! Codecs for boolean, integer, float and `numeric` values.
use rust_decimal::Decimal;

use super::{exact, utf8, DecodeContext, DecodeError, Value};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decimal max mantissa, 96 bits.
const MAX_MANTISSA: i128 = 79_228_162_514_264_337_593_543_950_335;
const MAX_SCALE: u32 = 28;

/// An arbitrary precision `numeric` value.
///
/// The special values have no [`Decimal`] representation and get their
/// own variants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Numeric {
    NaN,
    Infinity,
    NegInfinity,
    Value(Decimal),
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NaN => f.write_str("NaN"),
            Self::Infinity => f.write_str("Infinity"),
            Self::NegInfinity => f.write_str("-Infinity"),
            Self::Value(d) => d.fmt(f),
        }
    }
}

impl From<Decimal> for Numeric {
    fn from(value: Decimal) -> Self {
        Self::Value(value)
    }
}

pub(crate) fn bool_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    match buf {
        b"t" => Ok(Value::Bool(true)),
        b"f" => Ok(Value::Bool(false)),
        _ => Err(DecodeError::invalid("bool")),
    }
}

pub(crate) fn bool_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    match exact::<1>("bool", buf)? {
        [0] => Ok(Value::Bool(false)),
        [1] => Ok(Value::Bool(true)),
        _ => Err(DecodeError::invalid("bool")),
    }
}

pub(crate) fn int2_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    utf8(buf)?.parse().map(Value::Int2).map_err(|_| DecodeError::invalid("int2"))
}

pub(crate) fn int2_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int2(i16::from_be_bytes(exact("int2", buf)?)))
}

pub(crate) fn int4_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    utf8(buf)?.parse().map(Value::Int4).map_err(|_| DecodeError::invalid("int4"))
}

pub(crate) fn int4_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int4(i32::from_be_bytes(exact("int4", buf)?)))
}

pub(crate) fn int8_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    utf8(buf)?.parse().map(Value::Int8).map_err(|_| DecodeError::invalid("int8"))
}

pub(crate) fn int8_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int8(i64::from_be_bytes(exact("int8", buf)?)))
}

pub(crate) fn uint4_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    utf8(buf)?.parse().map(Value::Uint4).map_err(|_| DecodeError::invalid("oid"))
}

pub(crate) fn uint4_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Uint4(u32::from_be_bytes(exact("oid", buf)?)))
}

pub(crate) fn float4_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    utf8(buf)?.parse().map(Value::Float4).map_err(|_| DecodeError::invalid("float4"))
}

pub(crate) fn float4_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Float4(f32::from_be_bytes(exact("float4", buf)?)))
}

pub(crate) fn float8_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    utf8(buf)?.parse().map(Value::Float8).map_err(|_| DecodeError::invalid("float8"))
}

pub(crate) fn float8_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Float8(f64::from_be_bytes(exact("float8", buf)?)))
}

pub(crate) fn tid_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let err = || DecodeError::invalid("tid");
    let inner = utf8(buf)?.strip_prefix('(').and_then(|s| s.strip_suffix(')')).ok_or_else(err)?;
    let (block, offset) = inner.split_once(',').ok_or_else(err)?;
    Ok(Value::Tid {
        block: block.parse().map_err(|_| err())?,
        offset: offset.parse().map_err(|_| err())?,
    })
}

pub(crate) fn tid_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let raw = exact::<6>("tid", buf)?;
    Ok(Value::Tid {
        block: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
        offset: u16::from_be_bytes([raw[4], raw[5]]),
    })
}

pub(crate) fn numeric_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    let num = match text {
        "NaN" => Numeric::NaN,
        "Infinity" => Numeric::Infinity,
        "-Infinity" => Numeric::NegInfinity,
        _ => text
            .parse::<Decimal>()
            .map(Numeric::Value)
            .map_err(|_| DecodeError::invalid("numeric"))?,
    };
    Ok(Value::Numeric(num))
}

/// Decode the base 10000 binary representation.
pub(crate) fn numeric_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    if buf.len() < 8 {
        return Err(DecodeError::length("numeric", buf.len()));
    }
    let ndigits = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let weight = i16::from_be_bytes([buf[2], buf[3]]) as i32;
    let sign = u16::from_be_bytes([buf[4], buf[5]]);
    let dscale = u16::from_be_bytes([buf[6], buf[7]]) as i32;
    if buf.len() != 8 + ndigits * 2 {
        return Err(DecodeError::length("numeric", buf.len()));
    }

    let negative = match sign {
        NUMERIC_POS => false,
        NUMERIC_NEG => true,
        NUMERIC_NAN => return Ok(Value::Numeric(Numeric::NaN)),
        NUMERIC_PINF => return Ok(Value::Numeric(Numeric::Infinity)),
        NUMERIC_NINF => return Ok(Value::Numeric(Numeric::NegInfinity)),
        _ => return Err(DecodeError::invalid("numeric")),
    };

    // expand to single decimal digits so dscale can cut the tail
    let mut digits = Vec::with_capacity(ndigits * 4);
    for chunk in buf[8..].chunks_exact(2) {
        let pg_digit = u16::from_be_bytes([chunk[0], chunk[1]]);
        if pg_digit > 9999 {
            return Err(DecodeError::invalid("numeric"));
        }
        digits.extend([
            (pg_digit / 1000) as u8,
            (pg_digit / 100 % 10) as u8,
            (pg_digit / 10 % 10) as u8,
            (pg_digit % 10) as u8,
        ]);
    }

    // exponent of the last decimal digit
    let mut exp = (weight + 1 - ndigits as i32) * 4;
    if -exp > dscale {
        let drop = (-exp - dscale) as usize;
        digits.truncate(digits.len().saturating_sub(drop));
        exp = -dscale;
    }
    if exp > 0 {
        digits.resize(digits.len() + exp as usize, 0);
        exp = 0;
    }

    let scale = (-exp) as u32;
    if scale > MAX_SCALE {
        return Err(DecodeError::out_of_range("numeric"));
    }
    let mut mantissa: i128 = 0;
    for digit in digits {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(digit as i128))
            .filter(|m| *m <= MAX_MANTISSA)
            .ok_or(DecodeError::out_of_range("numeric"))?;
    }
    if negative {
        mantissa = -mantissa;
    }
    Ok(Value::Numeric(Numeric::Value(Decimal::from_i128_with_scale(mantissa, scale))))
}

/// Encode into the base 10000 binary representation.
///
/// `None` when the weight overflows its wire width, the caller falls
/// back to a text parameter.
pub(crate) fn numeric_to_bin(num: &Numeric) -> Option<Vec<u8>> {
    let special = |sign: u16| {
        let mut out = vec![0u8; 8];
        out[4..6].copy_from_slice(&sign.to_be_bytes());
        Some(out)
    };
    let decimal = match num {
        Numeric::NaN => return special(NUMERIC_NAN),
        Numeric::Infinity => return special(NUMERIC_PINF),
        Numeric::NegInfinity => return special(NUMERIC_NINF),
        Numeric::Value(decimal) => decimal,
    };

    let mantissa = decimal.mantissa();
    let scale = decimal.scale() as i32;
    let sign = match mantissa < 0 {
        true => NUMERIC_NEG,
        false => NUMERIC_POS,
    };
    let mut itoa_buf = itoa::Buffer::new();
    let digits = itoa_buf.format(mantissa.unsigned_abs()).as_bytes();

    let exp = -scale;
    let total = digits.len() as i32 + exp;
    let (quot, rem) = (total.div_euclid(4), total.rem_euclid(4));
    let weight = quot + (rem != 0) as i32 - 1;
    if i16::try_from(weight).is_err() {
        return None;
    }

    let mut pg_digits = Vec::<u16>::with_capacity(digits.len() / 4 + 1);
    let mut pg_digit = 0u16;
    let mut filled = if rem != 0 { 4 - rem } else { 0 };
    for digit in digits {
        pg_digit = pg_digit * 10 + (digit - b'0') as u16;
        filled += 1;
        if filled == 4 {
            pg_digits.push(pg_digit);
            pg_digit = 0;
            filled = 0;
        }
    }
    if filled != 0 {
        pg_digits.push(pg_digit * 10u16.pow(4 - filled as u32));
    }

    let mut out = Vec::with_capacity(8 + pg_digits.len() * 2);
    out.extend((pg_digits.len() as u16).to_be_bytes());
    out.extend((weight as i16).to_be_bytes());
    out.extend(sign.to_be_bytes());
    out.extend((scale as u16).to_be_bytes());
    for pg_digit in pg_digits {
        out.extend(pg_digit.to_be_bytes());
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext::default()
    }

    fn decimal(s: &str) -> Numeric {
        Numeric::Value(s.parse().unwrap())
    }

    #[test]
    fn int_codecs() {
        assert_eq!(int4_text(&ctx(), b"-42").unwrap(), Value::Int4(-42));
        assert_eq!(int4_bin(&ctx(), &(-42i32).to_be_bytes()).unwrap(), Value::Int4(-42));
        assert!(int4_bin(&ctx(), &[0, 0, 0]).is_err());
        assert_eq!(int8_bin(&ctx(), &7i64.to_be_bytes()).unwrap(), Value::Int8(7));
    }

    #[test]
    fn float_text_special_values() {
        let Value::Float8(nan) = float8_text(&ctx(), b"NaN").unwrap() else { panic!() };
        assert!(nan.is_nan());
        assert_eq!(float8_text(&ctx(), b"-Infinity").unwrap(), Value::Float8(f64::NEG_INFINITY));
    }

    #[test]
    fn numeric_binary_roundtrip() {
        let num = decimal("12345.67");
        let wire = numeric_to_bin(&num).unwrap();
        assert_eq!(numeric_bin(&ctx(), &wire).unwrap(), Value::Numeric(num));

        let neg = decimal("-0.00123");
        let wire = numeric_to_bin(&neg).unwrap();
        assert_eq!(numeric_bin(&ctx(), &wire).unwrap(), Value::Numeric(neg));
    }

    #[test]
    fn numeric_nan_sign_word() {
        let wire = numeric_to_bin(&Numeric::NaN).unwrap();
        assert_eq!(&wire, &[0, 0, 0, 0, 0xC0, 0, 0, 0]);
        assert_eq!(numeric_bin(&ctx(), &wire).unwrap(), Value::Numeric(Numeric::NaN));
    }

    #[test]
    fn numeric_infinity_sign_words() {
        let pinf = [0, 0, 0, 0, 0xD0, 0, 0, 0];
        assert_eq!(numeric_bin(&ctx(), &pinf).unwrap(), Value::Numeric(Numeric::Infinity));
        let ninf = [0, 0, 0, 0, 0xF0, 0, 0, 0];
        assert_eq!(numeric_bin(&ctx(), &ninf).unwrap(), Value::Numeric(Numeric::NegInfinity));
    }

    #[test]
    fn numeric_dscale_cuts_padding() {
        // 12345.67 encoded as 0001 2345 6700 with dscale 2
        let num = decimal("12345.67");
        let wire = numeric_to_bin(&num).unwrap();
        assert_eq!(u16::from_be_bytes([wire[0], wire[1]]), 3);
        assert_eq!(i16::from_be_bytes([wire[2], wire[3]]), 1);
        assert_eq!(u16::from_be_bytes([wire[6], wire[7]]), 2);
        let Value::Numeric(Numeric::Value(decoded)) = numeric_bin(&ctx(), &wire).unwrap() else {
            panic!()
        };
        assert_eq!(decoded.scale(), 2);
    }

    #[test]
    fn numeric_text_special_values() {
        assert_eq!(numeric_text(&ctx(), b"NaN").unwrap(), Value::Numeric(Numeric::NaN));
        assert_eq!(numeric_text(&ctx(), b"Infinity").unwrap(), Value::Numeric(Numeric::Infinity));
        assert_eq!(numeric_text(&ctx(), b"12.5").unwrap(), Value::Numeric(decimal("12.5")));
    }

    #[test]
    fn numeric_mantissa_overflow() {
        // 40 digits cannot fit the client decimal
        let mut wire = Vec::new();
        wire.extend(10u16.to_be_bytes());
        wire.extend(9i16.to_be_bytes());
        wire.extend(NUMERIC_POS.to_be_bytes());
        wire.extend(0u16.to_be_bytes());
        for _ in 0..10 {
            wire.extend(9999u16.to_be_bytes());
        }
        assert!(matches!(
            numeric_bin(&ctx(), &wire),
            Err(DecodeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn tid_codecs() {
        assert_eq!(tid_text(&ctx(), b"(5,12)").unwrap(), Value::Tid { block: 5, offset: 12 });
        let wire = [0, 0, 0, 5, 0, 12];
        assert_eq!(tid_bin(&ctx(), &wire).unwrap(), Value::Tid { block: 5, offset: 12 });
    }
}
