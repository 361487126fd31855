//! Codecs for textual types, `bytea`, `uuid` and json.
use super::{exact, utf8, DecodeContext, DecodeError, Value};

pub(crate) fn text_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Text(utf8(buf)?.to_owned()))
}

pub(crate) fn bytes_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Bytea(buf.to_vec()))
}

fn hex_nibble(b: u8) -> Result<u8, DecodeError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(DecodeError::invalid("bytea")),
    }
}

/// Decode the `\x` hex and the legacy octal escape output formats.
pub(crate) fn bytea_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    if let Some(hex) = buf.strip_prefix(b"\\x") {
        if hex.len() % 2 != 0 {
            return Err(DecodeError::invalid("bytea"));
        }
        let mut out = Vec::with_capacity(hex.len() / 2);
        for pair in hex.chunks_exact(2) {
            out.push(hex_nibble(pair[0])? << 4 | hex_nibble(pair[1])?);
        }
        return Ok(Value::Bytea(out));
    }

    let mut out = Vec::with_capacity(buf.len());
    let mut iter = buf.iter();
    while let Some(&byte) = iter.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        match iter.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(&first @ b'0'..=b'3') => {
                let (Some(&second @ b'0'..=b'7'), Some(&third @ b'0'..=b'7')) =
                    (iter.next(), iter.next())
                else {
                    return Err(DecodeError::invalid("bytea"));
                };
                out.push((first - b'0') << 6 | (second - b'0') << 3 | (third - b'0'));
            }
            _ => return Err(DecodeError::invalid("bytea")),
        }
    }
    Ok(Value::Bytea(out))
}

pub(crate) fn uuid_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    uuid::Uuid::try_parse_ascii(buf).map(Value::Uuid).map_err(|_| DecodeError::invalid("uuid"))
}

pub(crate) fn uuid_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Uuid(uuid::Uuid::from_bytes(exact("uuid", buf)?)))
}

pub(crate) fn json_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(buf).map(Value::Json).map_err(DecodeError::Json)
}

/// `jsonb` binary output is the json text behind a version byte.
pub(crate) fn jsonb_bin(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    match buf.split_first() {
        Some((1, json)) => json_text(ctx, json),
        _ => Err(DecodeError::invalid("jsonb")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext::default()
    }

    #[test]
    fn bytea_hex() {
        assert_eq!(
            bytea_text(&ctx(), b"\\x48656c6c6f").unwrap(),
            Value::Bytea(b"Hello".to_vec()),
        );
        assert!(bytea_text(&ctx(), b"\\x4865g").is_err());
    }

    #[test]
    fn bytea_octal_escapes() {
        assert_eq!(
            bytea_text(&ctx(), b"ab\\\\cd\\001").unwrap(),
            Value::Bytea(b"ab\\cd\x01".to_vec()),
        );
        assert!(bytea_text(&ctx(), b"ab\\9").is_err());
        assert!(bytea_text(&ctx(), b"ab\\0").is_err());
    }

    #[test]
    fn jsonb_version_byte() {
        let value = jsonb_bin(&ctx(), b"\x01{\"a\": [1, 2]}").unwrap();
        assert_eq!(value, Value::Json(serde_json::json!({"a": [1, 2]})));
        assert!(jsonb_bin(&ctx(), b"\x02{}").is_err());
        assert!(jsonb_bin(&ctx(), b"{}").is_err());
    }

    #[test]
    fn uuid_codecs() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let parsed = uuid_text(&ctx(), id.as_bytes()).unwrap();
        let Value::Uuid(uuid) = parsed else { panic!() };
        assert_eq!(uuid_bin(&ctx(), uuid.as_bytes()).unwrap(), Value::Uuid(uuid));
    }
}
