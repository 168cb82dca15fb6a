//! Chunk framing for chunked transfer encoding
//! ([RFC 7230 section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1)).
//!
//! Only the framing goes through this encoder: the size line for the next
//! chunk and the terminating zero chunk are written into a small dedicated
//! buffer, while the chunk data itself is scatter-written straight from the
//! caller's buffer. Each frame prefix carries the CRLF that closes the
//! previous chunk's data, which is what lets a chunk be flushed as
//! `[framing, data]` without touching the data.

use std::io::Write;

use bytes::BytesMut;

use crate::protocol::SendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    wrote_chunk: bool,
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { wrote_chunk: false, eof: false }
    }

    /// Writes the size line introducing a chunk of `len` bytes.
    pub fn frame_prefix(&mut self, len: usize, dst: &mut BytesMut) -> Result<(), SendError> {
        debug_assert!(len > 0);
        if self.eof {
            return Err(SendError::illegal_state("chunk after terminating chunk"));
        }

        if self.wrote_chunk {
            dst.extend_from_slice(b"\r\n");
        }
        write!(helper::Writer(dst), "{:X}\r\n", len)?;
        self.wrote_chunk = true;
        Ok(())
    }

    /// Writes the terminating zero chunk.
    pub fn frame_last(&mut self, dst: &mut BytesMut) -> Result<(), SendError> {
        if self.eof {
            return Err(SendError::illegal_state("terminating chunk written twice"));
        }

        if self.wrote_chunk {
            dst.extend_from_slice(b"\r\n");
        }
        dst.extend_from_slice(b"0\r\n\r\n");
        self.eof = true;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.eof
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
