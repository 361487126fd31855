//! Codec for the `hstore` extension type.
//!
//! Extension types have no fixed oid, the caller looks it up in
//! `pg_type` and registers the codec pair from
//! [`hstore_decoders`][super::hstore_decoders] on the connection.
use super::{utf8, DecodeContext, DecodeError, Value};

fn err() -> DecodeError {
    DecodeError::invalid("hstore")
}

/// Decode the text representation, e.g `"a"=>"1", "b"=>NULL`.
pub(crate) fn hstore_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let mut pairs = vec![];
    let mut i = 0;
    while i < buf.len() {
        let (key, consumed) = parse_quoted(&buf[i..])?;
        i += consumed;
        match buf.get(i..i + 2) {
            Some(b"=>") => i += 2,
            _ => return Err(err()),
        }
        let value = match buf.get(i) {
            Some(b'"') => {
                let (value, consumed) = parse_quoted(&buf[i..])?;
                i += consumed;
                Some(value)
            }
            _ => {
                let end = buf[i..]
                    .iter()
                    .position(|b| *b == b',')
                    .unwrap_or(buf.len() - i);
                match &buf[i..i + end] {
                    b"NULL" => i += end,
                    _ => return Err(err()),
                }
                None
            }
        };
        pairs.push((key, value));
        if i < buf.len() {
            if buf[i] != b',' {
                return Err(err());
            }
            i += 1;
            while buf.get(i) == Some(&b' ') {
                i += 1;
            }
        }
    }
    Ok(Value::Hstore(pairs))
}

/// Parse one quoted item, backslash escapes any byte.
fn parse_quoted(buf: &[u8]) -> Result<(String, usize), DecodeError> {
    if buf.first() != Some(&b'"') {
        return Err(err());
    }
    let mut chunk = vec![];
    let mut i = 1;
    loop {
        match buf.get(i).ok_or_else(err)? {
            b'\\' => {
                chunk.push(*buf.get(i + 1).ok_or_else(err)?);
                i += 2;
            }
            b'"' => return Ok((utf8(&chunk)?.to_owned(), i + 1)),
            b => {
                chunk.push(*b);
                i += 1;
            }
        }
    }
}

/// Decode the binary representation, a pair count and length framed
/// keys and values, `-1` marks a null value.
pub(crate) fn hstore_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let mut rest = buf;
    let count = read_len(&mut rest)?.ok_or_else(err)?;
    // every pair costs at least its two length fields, cap what a bogus
    // count can allocate up front
    let mut pairs = Vec::with_capacity(count.min(rest.len() / 8));
    while !rest.is_empty() {
        let key = read_item(&mut rest)?.ok_or_else(err)?;
        let key = utf8(key)?.to_owned();
        let value = match read_item(&mut rest)? {
            Some(item) => Some(utf8(item)?.to_owned()),
            None => None,
        };
        pairs.push((key, value));
    }
    if pairs.len() != count {
        return Err(err());
    }
    Ok(Value::Hstore(pairs))
}

/// Read a length field, `None` for `-1`.
fn read_len(rest: &mut &[u8]) -> Result<Option<usize>, DecodeError> {
    let Some((head, tail)) = rest.split_first_chunk::<4>() else {
        return Err(DecodeError::length("hstore", rest.len()));
    };
    *rest = tail;
    match i32::from_be_bytes(*head) {
        -1 => Ok(None),
        len => usize::try_from(len).map(Some).map_err(|_| err()),
    }
}

fn read_item<'a>(rest: &mut &'a [u8]) -> Result<Option<&'a [u8]>, DecodeError> {
    let Some(len) = read_len(rest)? else { return Ok(None) };
    if rest.len() < len {
        return Err(DecodeError::length("hstore", rest.len()));
    }
    let item = &rest[..len];
    *rest = &rest[len..];
    Ok(Some(item))
}
