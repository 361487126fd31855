//! Codecs for range and multirange values.
use super::{Decoder, DecodeContext, DecodeError, Value};

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;
const RANGE_FLAGS: u8 =
    RANGE_EMPTY | RANGE_LB_INC | RANGE_UB_INC | RANGE_LB_INF | RANGE_UB_INF;

fn err() -> DecodeError {
    DecodeError::invalid("range")
}

/// A range over any decoded element type.
///
/// `None` bounds are unbounded. The empty range has no bounds at all.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RangeValue {
    pub empty: bool,
    pub lower: Option<Value>,
    pub upper: Option<Value>,
    pub lower_inc: bool,
    pub upper_inc: bool,
}

impl RangeValue {
    pub fn empty() -> Self {
        Self { empty: true, ..Self::default() }
    }

    /// Build a range from its bounds and the bound characters.
    ///
    /// A range with equal bounds which are not both inclusive holds
    /// nothing and collapses to the empty range.
    pub fn new(lower: Option<Value>, upper: Option<Value>, bounds: (u8, u8)) -> Result<Self, DecodeError> {
        let lower_inc = match bounds.0 {
            b'[' => lower.is_some(),
            b'(' => false,
            _ => return Err(err()),
        };
        let upper_inc = match bounds.1 {
            b']' => upper.is_some(),
            b')' => false,
            _ => return Err(err()),
        };
        if let (Some(lo), Some(up)) = (&lower, &upper) {
            if lo == up && !(lower_inc && upper_inc) {
                return Ok(Self::empty());
            }
        }
        Ok(Self { empty: false, lower, upper, lower_inc, upper_inc })
    }
}

/// Decode the text representation, e.g `[1,10)` or `empty`.
pub(crate) fn decode_text(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<RangeValue, DecodeError> {
    if buf == b"empty" {
        return Ok(RangeValue::empty());
    }
    let (&open, rest) = buf.split_first().ok_or_else(err)?;
    let (&close, inner) = rest.split_last().ok_or_else(err)?;
    let (lower, consumed) = parse_bound(ctx, inner, elem, b',')?;
    let inner = &inner[consumed..];
    if inner.first() != Some(&b',') {
        return Err(err());
    }
    let (upper, consumed) = parse_bound(ctx, &inner[1..], elem, 0)?;
    if consumed != inner.len() - 1 {
        return Err(err());
    }
    RangeValue::new(lower, upper, (open, close))
}

/// Parse one bound up to the terminator, empty means unbounded.
fn parse_bound(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
    terminator: u8,
) -> Result<(Option<Value>, usize), DecodeError> {
    if buf.first() == Some(&b'"') {
        let mut chunk = vec![];
        let mut i = 1;
        loop {
            match buf.get(i).ok_or_else(err)? {
                b'\\' => {
                    chunk.push(*buf.get(i + 1).ok_or_else(err)?);
                    i += 2;
                }
                b'"' if buf.get(i + 1) == Some(&b'"') => {
                    chunk.push(b'"');
                    i += 2;
                }
                b'"' => return Ok((Some(elem(ctx, &chunk)?), i + 1)),
                b => {
                    chunk.push(*b);
                    i += 1;
                }
            }
        }
    }
    let end = match terminator {
        0 => buf.len(),
        _ => buf.iter().position(|b| *b == terminator).unwrap_or(buf.len()),
    };
    let bound = match end {
        0 => None,
        _ => Some(elem(ctx, &buf[..end])?),
    };
    Ok((bound, end))
}

/// Decode the binary representation, a flags byte and the present bounds.
pub(crate) fn decode_bin(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<RangeValue, DecodeError> {
    let (&flags, mut rest) = buf.split_first().ok_or_else(err)?;
    if flags & !RANGE_FLAGS != 0 {
        return Err(err());
    }
    if flags & RANGE_EMPTY != 0 {
        return match rest.is_empty() {
            true => Ok(RangeValue::empty()),
            false => Err(err()),
        };
    }
    let lower = match flags & RANGE_LB_INF == 0 {
        true => Some(parse_bin_bound(ctx, &mut rest, elem)?),
        false => None,
    };
    let upper = match flags & RANGE_UB_INF == 0 {
        true => Some(parse_bin_bound(ctx, &mut rest, elem)?),
        false => None,
    };
    if !rest.is_empty() {
        return Err(err());
    }
    Ok(RangeValue {
        empty: false,
        lower_inc: flags & RANGE_LB_INC != 0,
        upper_inc: flags & RANGE_UB_INC != 0,
        lower,
        upper,
    })
}

fn read_len(rest: &mut &[u8], r#type: &'static str) -> Result<usize, DecodeError> {
    let Some((head, tail)) = rest.split_first_chunk::<4>() else {
        return Err(DecodeError::length(r#type, rest.len()));
    };
    *rest = tail;
    usize::try_from(i32::from_be_bytes(*head)).map_err(|_| DecodeError::invalid(r#type))
}

fn parse_bin_bound(
    ctx: &DecodeContext,
    rest: &mut &[u8],
    elem: Decoder,
) -> Result<Value, DecodeError> {
    let len = read_len(rest, "range")?;
    if rest.len() < len {
        return Err(DecodeError::length("range", rest.len()));
    }
    let value = elem(ctx, &rest[..len])?;
    *rest = &rest[len..];
    Ok(value)
}

pub(crate) fn range_text(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<Value, DecodeError> {
    decode_text(ctx, buf, elem).map(|range| Value::Range(Box::new(range)))
}

pub(crate) fn range_bin(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<Value, DecodeError> {
    decode_bin(ctx, buf, elem).map(|range| Value::Range(Box::new(range)))
}

/// Decode the text representation, e.g `{[1,3),[5,7)}`.
pub(crate) fn multirange_text(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<Value, DecodeError> {
    let merr = || DecodeError::invalid("multirange");
    let inner = buf
        .strip_prefix(b"{")
        .and_then(|rest| rest.strip_suffix(b"}"))
        .ok_or_else(merr)?;
    let mut ranges = vec![];
    let mut i = 0;
    while i < inner.len() {
        if !ranges.is_empty() {
            if inner.get(i) != Some(&b',') {
                return Err(merr());
            }
            i += 1;
        }
        let end = range_end(&inner[i..]).ok_or_else(merr)?;
        ranges.push(decode_text(ctx, &inner[i..i + end], elem)?);
        i += end;
    }
    Ok(Value::Multirange(ranges))
}

/// Length of the next range item, quotes may hide brackets and commas.
fn range_end(buf: &[u8]) -> Option<usize> {
    if buf.starts_with(b"empty") {
        return Some(5);
    }
    if !matches!(buf.first(), Some(b'[' | b'(')) {
        return None;
    }
    let mut i = 1;
    let mut quoted = false;
    while let Some(&b) = buf.get(i) {
        match b {
            b'\\' if quoted => i += 1,
            b'"' => quoted = !quoted,
            b']' | b')' if !quoted => return Some(i + 1),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Decode the binary representation, a count and the length framed ranges.
pub(crate) fn multirange_bin(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<Value, DecodeError> {
    let merr = || DecodeError::invalid("multirange");
    let Some((count_raw, mut rest)) = buf.split_first_chunk::<4>() else {
        return Err(DecodeError::length("multirange", buf.len()));
    };
    let count = u32::from_be_bytes(*count_raw);
    // every range costs at least a length field and a flags byte, cap
    // what a bogus count can allocate up front
    let mut ranges = Vec::with_capacity((count as usize).min(rest.len() / 5));
    for _ in 0..count {
        let len = read_len(&mut rest, "multirange")?;
        if rest.len() < len {
            return Err(DecodeError::length("multirange", rest.len()));
        }
        ranges.push(decode_bin(ctx, &rest[..len], elem)?);
        rest = &rest[len..];
    }
    match rest.is_empty() {
        true => Ok(Value::Multirange(ranges)),
        false => Err(merr()),
    }
}
