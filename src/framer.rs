//! Incremental message framing over externally supplied bytes.
//!
//! The framer performs no reading itself. The caller asks for a spare
//! buffer with [`get_buffer`][Framer::get_buffer], fills some of it,
//! reports the amount with [`buffer_updated`][Framer::buffer_updated]
//! and drains complete messages with [`next_frame`][Framer::next_frame].
use bytes::Bytes;

use crate::{common::verbose, protocol::ProtocolError};

/// Size of the standing receive buffer.
pub(crate) const STANDARD_BUF_SIZE: usize = 0x4000;

/// Tag byte plus the length field.
const HEADER_LEN: usize = 5;

/// One framed backend message.
#[derive(Debug)]
pub struct Frame {
    pub tag: u8,
    pub body: Bytes,
}

/// Where incoming bytes currently accumulate.
///
/// Messages beyond the standing buffer size get a dedicated allocation
/// which is released as soon as the message is framed.
enum RecvBuffer {
    Standing,
    Overflow(Vec<u8>),
}

pub struct Framer {
    standing: Box<[u8; STANDARD_BUF_SIZE]>,
    recv: RecvBuffer,
    /// Unprocessed bytes in the active buffer, starting at `pos`.
    filled: usize,
    /// Start of the unprocessed bytes.
    pos: usize,
    /// Bytes required to complete the current part.
    needed: usize,
    /// Tag of the message currently awaiting its body.
    tag: Option<u8>,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            standing: Box::new([0u8; STANDARD_BUF_SIZE]),
            recv: RecvBuffer::Standing,
            filled: 0,
            pos: 0,
            needed: HEADER_LEN,
            tag: None,
        }
    }

    /// Spare buffer space to read into.
    ///
    /// Never empty, the standing buffer always leaves room for the next
    /// message part.
    pub fn get_buffer(&mut self) -> &mut [u8] {
        self.compact();
        match &mut self.recv {
            RecvBuffer::Standing => &mut self.standing[self.filled..],
            RecvBuffer::Overflow(buf) => &mut buf[self.filled..],
        }
    }

    /// Report `read` bytes written into [`get_buffer`][Framer::get_buffer].
    ///
    /// `0` is always valid and only resumes draining buffered bytes.
    pub fn buffer_updated(&mut self, read: usize) {
        debug_assert!(read == 0 || self.pos == 0, "buffer_updated without get_buffer");
        self.filled += read;
    }

    /// Drain the next complete message, `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if self.filled < self.needed {
                self.compact();
                return Ok(None);
            }
            match self.tag {
                None => self.start_message()?,
                Some(tag) => {
                    let body = self.take_body();
                    verbose!("frame {:?} ({} bytes)", tag as char, body.len());
                    self.tag = None;
                    self.needed = HEADER_LEN;
                    return Ok(Some(Frame { tag, body }));
                }
            }
        }
    }

    fn start_message(&mut self) -> Result<(), ProtocolError> {
        debug_assert!(matches!(self.recv, RecvBuffer::Standing));
        let header = &self.standing[self.pos..self.pos + HEADER_LEN];
        let tag = header[0];
        let mut len_raw = [0u8; 4];
        len_raw.copy_from_slice(&header[1..]);
        let len = i32::from_be_bytes(len_raw);
        let Ok(body_len) = usize::try_from(i64::from(len) - 4) else {
            return Err(ProtocolError::negative_length(len));
        };
        self.pos += HEADER_LEN;
        self.filled -= HEADER_LEN;
        self.tag = Some(tag);
        self.needed = body_len;
        if body_len > STANDARD_BUF_SIZE {
            // move the partial body into a dedicated buffer
            let mut overflow = vec![0u8; body_len];
            overflow[..self.filled]
                .copy_from_slice(&self.standing[self.pos..self.pos + self.filled]);
            self.recv = RecvBuffer::Overflow(overflow);
            self.pos = 0;
        }
        Ok(())
    }

    fn take_body(&mut self) -> Bytes {
        let len = self.needed;
        match std::mem::replace(&mut self.recv, RecvBuffer::Standing) {
            RecvBuffer::Standing => {
                let body = Bytes::copy_from_slice(&self.standing[self.pos..self.pos + len]);
                self.pos += len;
                self.filled -= len;
                body
            }
            // sized exactly for the message, no trailing bytes possible
            RecvBuffer::Overflow(buf) => {
                debug_assert_eq!(buf.len(), len);
                self.pos = 0;
                self.filled = 0;
                Bytes::from(buf)
            }
        }
    }

    /// Move the unprocessed tail to the buffer front.
    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        let (pos, filled) = (self.pos, self.filled);
        match &mut self.recv {
            RecvBuffer::Standing => self.standing.copy_within(pos..pos + filled, 0),
            RecvBuffer::Overflow(buf) => buf.copy_within(pos..pos + filled, 0),
        }
        self.pos = 0;
    }
}
