//! Extension traits over byte buffers used by the wire codecs.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{common::ByteStr, protocol::ProtocolError};

pub trait UsizeExt {
    /// Cast to `u32` which the postgres wire protocol length is represented.
    ///
    /// # Panics
    ///
    /// Panic when overflowed, message sizes are validated before encoding starts.
    fn to_u32(self) -> u32;

    /// Cast to `u16` which some of postgres wire protocol length is represented.
    ///
    /// # Panics
    ///
    /// Panic when overflowed, parameter counts are validated before encoding starts.
    fn to_u16(self) -> u16;
}

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        u32::try_from(self).unwrap()
    }

    fn to_u16(self) -> u16 {
        u16::try_from(self).unwrap()
    }
}

pub trait StrExt {
    /// String length plus nul terminator, as the wire protocol encodes strings.
    fn nul_string_len(&self) -> usize;
}

impl StrExt for str {
    fn nul_string_len(&self) -> usize {
        self.len() + 1
    }
}

pub trait BufMutExt {
    /// Write string bytes followed by the nul terminator.
    fn put_nul_string(&mut self, string: &str);
}

impl BufMutExt for BytesMut {
    fn put_nul_string(&mut self, string: &str) {
        self.put_slice(string.as_bytes());
        self.put_u8(0);
    }
}

pub trait BytesExt {
    /// Split a nul terminated string from the front of the buffer.
    fn get_nul_bytestr(&mut self, msgtype: u8) -> Result<ByteStr, ProtocolError>;
}

impl BytesExt for Bytes {
    fn get_nul_bytestr(&mut self, msgtype: u8) -> Result<ByteStr, ProtocolError> {
        let end = self
            .iter()
            .position(|b| *b == 0)
            .ok_or(ProtocolError::missing_nul(msgtype))?;
        let str = ByteStr::from_utf8(self.split_to(end)).map_err(ProtocolError::non_utf8)?;
        self.advance(1);
        Ok(str)
    }
}

/// Checked reads of fixed width integers from a message body.
///
/// [`Buf`] panics on underflow, backend messages must instead fail decoding.
pub trait BufExt: Buf {
    fn try_get_u8_(&mut self, msgtype: u8) -> Result<u8, ProtocolError> {
        match self.remaining() >= 1 {
            true => Ok(self.get_u8()),
            false => Err(ProtocolError::truncated(msgtype)),
        }
    }

    fn try_get_i16_(&mut self, msgtype: u8) -> Result<i16, ProtocolError> {
        match self.remaining() >= 2 {
            true => Ok(self.get_i16()),
            false => Err(ProtocolError::truncated(msgtype)),
        }
    }

    fn try_get_u16_(&mut self, msgtype: u8) -> Result<u16, ProtocolError> {
        match self.remaining() >= 2 {
            true => Ok(self.get_u16()),
            false => Err(ProtocolError::truncated(msgtype)),
        }
    }

    fn try_get_i32_(&mut self, msgtype: u8) -> Result<i32, ProtocolError> {
        match self.remaining() >= 4 {
            true => Ok(self.get_i32()),
            false => Err(ProtocolError::truncated(msgtype)),
        }
    }

    fn try_get_u32_(&mut self, msgtype: u8) -> Result<u32, ProtocolError> {
        match self.remaining() >= 4 {
            true => Ok(self.get_u32()),
            false => Err(ProtocolError::truncated(msgtype)),
        }
    }
}

impl<B: Buf> BufExt for B { }
