//! Decoder for chunked transfer encoding
//! ([RFC 7230 section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1)).
//!
//! Works byte-at-a-time through a state machine so it makes progress on any
//! split of the input: size line (with optional extensions), chunk data,
//! per-chunk CRLF, and the terminating zero chunk with an optional trailer
//! section that is read and discarded.

use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, RequestEvent};

use ChunkedState::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Chunk size in hex
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Chunk extensions, ignored
    Extension,
    /// LF closing the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Trailer fields after the zero chunk, ignored
    Trailer,
    /// LF closing a trailer line
    TrailerLf,
    /// CR of the final empty line
    EndCr,
    /// LF of the final empty line
    EndLf,
    /// Terminal state
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = RequestEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(RequestEvent::End));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut chunk = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut chunk) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(next)) => next,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = chunk {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(RequestEvent::Content(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

impl ChunkedState {
    fn step(
        &self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        chunk: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, chunk),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => ChunkedState::read_trailer(src),
            TrailerLf => ChunkedState::read_trailer_lf(src),
            EndCr => ChunkedState::read_end_cr(src),
            EndLf => ChunkedState::read_end_lf(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return Poll::Ready(Err(ParseError::invalid_chunk("chunk size overflows u64"))),
                }
            };
        }

        let radix = 16;
        match try_next_byte!(src) {
            b @ b'0'..=b'9' => {
                *size = or_overflow!(size.checked_mul(radix));
                *size = or_overflow!(size.checked_add((b - b'0') as u64));
            }
            b @ b'a'..=b'f' => {
                *size = or_overflow!(size.checked_mul(radix));
                *size = or_overflow!(size.checked_add((b + 10 - b'a') as u64));
            }
            b @ b'A'..=b'F' => {
                *size = or_overflow!(size.checked_mul(radix));
                *size = or_overflow!(size.checked_add((b + 10 - b'A') as u64));
            }
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size line"))),
        }

        Poll::Ready(Ok(Size))
    }

    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            // LWS can follow the chunk size, but no more digits can come
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size linear white space"))),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        // Extensions are ignored; they end at the next CRLF. A bare LF is
        // rejected so that implementations skipping the CR cannot smuggle one.
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_chunk("chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if *size > 0 => Poll::Ready(Ok(Body)),
            // zero chunk: an optional trailer section follows
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("chunk size line must end with LF"))),
        }
    }

    fn read_body(src: &mut BytesMut, size: &mut u64, chunk: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        let len = std::cmp::min(*size, src.len() as u64);
        if len == 0 {
            return Poll::Pending;
        }

        let bytes = src.split_to(len as usize).freeze();
        *size -= bytes.len() as u64;
        *chunk = Some(bytes);

        if *size > 0 {
            Poll::Ready(Ok(Body))
        } else {
            Poll::Ready(Ok(BodyCr))
        }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("chunk data must end with CRLF"))),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("chunk data must end with CRLF"))),
        }
    }

    fn read_trailer(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("trailer line must end with LF"))),
        }
    }

    fn read_end_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            // another trailer field
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(End)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("terminating chunk must end with CRLF"))),
        }
    }
}
