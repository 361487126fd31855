//! Codecs for array values of any registered element type.
use crate::protocol::Oid;

use super::{Decoder, DecodeContext, DecodeError, Value};

const MAX_DIMENSIONS: usize = 6;

fn err() -> DecodeError {
    DecodeError::invalid("array")
}

/// Decode the text representation, e.g `{1,2,{3,4}}`.
///
/// A leading dimensions prefix like `[0:1]=` is skipped.
pub(crate) fn decode_text(
    ctx: &DecodeContext,
    buf: &[u8],
    delim: u8,
    elem: Decoder,
) -> Result<Value, DecodeError> {
    let start = buf.iter().position(|b| *b == b'{').ok_or_else(err)?;
    let (value, consumed) = parse_array(ctx, &buf[start..], delim, elem, 1)?;
    match start + consumed == buf.len() {
        true => Ok(value),
        false => Err(err()),
    }
}

fn parse_array(
    ctx: &DecodeContext,
    buf: &[u8],
    delim: u8,
    elem: Decoder,
    depth: usize,
) -> Result<(Value, usize), DecodeError> {
    if depth > MAX_DIMENSIONS {
        return Err(err());
    }
    let mut items = vec![];
    if buf.get(1) == Some(&b'}') {
        return Ok((Value::Array(items), 2));
    }
    let mut i = 1;
    loop {
        let (item, consumed) = match buf.get(i).ok_or_else(err)? {
            b'{' => parse_array(ctx, &buf[i..], delim, elem, depth + 1)?,
            b'"' => parse_quoted(ctx, &buf[i..], elem)?,
            _ => parse_unquoted(ctx, &buf[i..], delim, elem)?,
        };
        items.push(item);
        i += consumed;
        match buf.get(i) {
            Some(b'}') => return Ok((Value::Array(items), i + 1)),
            Some(b) if *b == delim => i += 1,
            _ => return Err(err()),
        }
    }
}

fn parse_quoted(
    ctx: &DecodeContext,
    buf: &[u8],
    elem: Decoder,
) -> Result<(Value, usize), DecodeError> {
    let mut chunk = vec![];
    let mut i = 1;
    loop {
        match buf.get(i).ok_or_else(err)? {
            b'\\' => {
                chunk.push(*buf.get(i + 1).ok_or_else(err)?);
                i += 2;
            }
            b'"' => return Ok((elem(ctx, &chunk)?, i + 1)),
            b => {
                chunk.push(*b);
                i += 1;
            }
        }
    }
}

fn parse_unquoted(
    ctx: &DecodeContext,
    buf: &[u8],
    delim: u8,
    elem: Decoder,
) -> Result<(Value, usize), DecodeError> {
    let end = buf
        .iter()
        .position(|b| *b == delim || *b == b'}')
        .ok_or_else(err)?;
    let chunk = &buf[..end];
    if chunk.is_empty() {
        return Err(err());
    }
    let item = match chunk {
        b"NULL" => Value::Null,
        _ => elem(ctx, chunk)?,
    };
    Ok((item, end))
}

fn read_u32(rest: &mut &[u8]) -> Result<u32, DecodeError> {
    let Some((head, tail)) = rest.split_first_chunk::<4>() else {
        return Err(DecodeError::length("array", rest.len()));
    };
    *rest = tail;
    Ok(u32::from_be_bytes(*head))
}

/// Decode the binary representation.
///
/// The element oid on the wire must match the registered element type.
pub(crate) fn decode_bin(
    ctx: &DecodeContext,
    buf: &[u8],
    elem_oid: Oid,
    elem: Decoder,
) -> Result<Value, DecodeError> {
    let mut rest = buf;
    let ndims = read_u32(&mut rest)? as usize;
    let flags = read_u32(&mut rest)?;
    let oid = read_u32(&mut rest)?;
    if flags > 1 || oid != elem_oid || ndims > MAX_DIMENSIONS {
        return Err(err());
    }

    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        let dim = read_u32(&mut rest)? as i32;
        // the lower bound is not represented
        read_u32(&mut rest)?;
        if dim <= 0 {
            return Err(err());
        }
        dims.push(dim as usize);
    }

    let value = match dims.is_empty() {
        true => Value::Array(vec![]),
        false => parse_items(ctx, &mut rest, &dims, elem)?,
    };
    match rest.is_empty() {
        true => Ok(value),
        false => Err(err()),
    }
}

fn parse_items(
    ctx: &DecodeContext,
    rest: &mut &[u8],
    dims: &[usize],
    elem: Decoder,
) -> Result<Value, DecodeError> {
    let (&dim, inner_dims) = dims.split_first().ok_or_else(err)?;
    // every element costs at least a length field, cap what a bogus
    // dimension count can allocate up front
    let mut items = Vec::with_capacity(dim.min(rest.len() / 4));
    for _ in 0..dim {
        if !inner_dims.is_empty() {
            items.push(parse_items(ctx, rest, inner_dims, elem)?);
            continue;
        }
        let len = read_u32(rest)? as i32;
        if len == -1 {
            items.push(Value::Null);
            continue;
        }
        let len = usize::try_from(len).map_err(|_| err())?;
        if rest.len() < len {
            return Err(DecodeError::length("array", rest.len()));
        }
        items.push(elem(ctx, &rest[..len])?);
        *rest = &rest[len..];
    }
    Ok(Value::Array(items))
}

#[cfg(test)]
mod test {
    use super::super::numeric;
    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext::default()
    }

    fn int_array(buf: &[u8]) -> Result<Value, DecodeError> {
        decode_text(&ctx(), buf, b',', numeric::int4_text)
    }

    fn ints(items: &[i32]) -> Value {
        Value::Array(items.iter().copied().map(Value::Int4).collect())
    }

    #[test]
    fn text_nested() {
        assert_eq!(
            int_array(b"{1,2,{3,4}}").unwrap(),
            Value::Array(vec![Value::Int4(1), Value::Int4(2), ints(&[3, 4])]),
        );
    }

    #[test]
    fn text_null_and_empty() {
        assert_eq!(
            int_array(b"{NULL,1}").unwrap(),
            Value::Array(vec![Value::Null, Value::Int4(1)]),
        );
        assert_eq!(int_array(b"{}").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn text_dimension_prefix() {
        assert_eq!(int_array(b"[0:1]={7,8}").unwrap(), ints(&[7, 8]));
    }

    #[test]
    fn text_quoted_elements() {
        let value = decode_text(&ctx(), b"{\"a\\\"b\",\"c,d\",NULL}", b',', super::super::text::text_text);
        assert_eq!(
            value.unwrap(),
            Value::Array(vec![
                Value::Text("a\"b".to_owned()),
                Value::Text("c,d".to_owned()),
                Value::Null,
            ]),
        );
    }

    #[test]
    fn text_malformed() {
        assert!(int_array(b"{1,2").is_err());
        assert!(int_array(b"{1,,2}").is_err());
        assert!(int_array(b"{1} ").is_err());
        assert!(int_array(b"1,2").is_err());
    }

    #[test]
    fn text_too_deep() {
        let six = b"{{{{{{1}}}}}}";
        let seven = b"{{{{{{{1}}}}}}}";
        assert!(int_array(six).is_ok());
        assert!(int_array(seven).is_err());
    }

    fn bin_header(out: &mut Vec<u8>, ndims: u32, oid: u32, dims: &[i32]) {
        out.extend(ndims.to_be_bytes());
        out.extend(0u32.to_be_bytes());
        out.extend(oid.to_be_bytes());
        for dim in dims {
            out.extend(dim.to_be_bytes());
            out.extend(1i32.to_be_bytes());
        }
    }

    #[test]
    fn binary_two_dimensions() {
        let mut wire = vec![];
        bin_header(&mut wire, 2, crate::types::oid::INT4, &[2, 2]);
        for v in [1i32, 2, 3, 4] {
            wire.extend(4i32.to_be_bytes());
            wire.extend(v.to_be_bytes());
        }
        assert_eq!(
            decode_bin(&ctx(), &wire, crate::types::oid::INT4, numeric::int4_bin).unwrap(),
            Value::Array(vec![ints(&[1, 2]), ints(&[3, 4])]),
        );
    }

    #[test]
    fn binary_zero_dimensions() {
        let mut wire = vec![];
        bin_header(&mut wire, 0, crate::types::oid::INT4, &[]);
        assert_eq!(
            decode_bin(&ctx(), &wire, crate::types::oid::INT4, numeric::int4_bin).unwrap(),
            Value::Array(vec![]),
        );
    }

    #[test]
    fn binary_bogus_dimension_count() {
        let mut wire = vec![];
        bin_header(&mut wire, 1, crate::types::oid::INT4, &[0x7FFF_FFFF]);
        assert!(decode_bin(&ctx(), &wire, crate::types::oid::INT4, numeric::int4_bin).is_err());
    }

    #[test]
    fn binary_element_oid_mismatch() {
        let mut wire = vec![];
        bin_header(&mut wire, 1, crate::types::oid::INT8, &[1]);
        wire.extend(4i32.to_be_bytes());
        wire.extend(5i32.to_be_bytes());
        assert!(decode_bin(&ctx(), &wire, crate::types::oid::INT4, numeric::int4_bin).is_err());
    }

    #[test]
    fn binary_null_element() {
        let mut wire = vec![];
        bin_header(&mut wire, 1, crate::types::oid::INT4, &[2]);
        wire.extend((-1i32).to_be_bytes());
        wire.extend(4i32.to_be_bytes());
        wire.extend(9i32.to_be_bytes());
        assert_eq!(
            decode_bin(&ctx(), &wire, crate::types::oid::INT4, numeric::int4_bin).unwrap(),
            Value::Array(vec![Value::Null, Value::Int4(9)]),
        );
    }

    #[test]
    fn binary_trailing_bytes() {
        let mut wire = vec![];
        bin_header(&mut wire, 1, crate::types::oid::INT4, &[1]);
        wire.extend(4i32.to_be_bytes());
        wire.extend(5i32.to_be_bytes());
        wire.push(0);
        assert!(decode_bin(&ctx(), &wire, crate::types::oid::INT4, numeric::int4_bin).is_err());
    }
}
