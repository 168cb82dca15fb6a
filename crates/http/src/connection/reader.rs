//! The inbound half of a connection: fill, parse, repeat.
//!
//! Owns the pooled request buffer and the request decoder. The buffer is
//! acquired lazily on the first fill of a message and released back to the
//! pool whenever it is empty and nobody is about to need it, so an idle
//! persistent connection holds no buffer at all.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::RequestDecoder;
use crate::config::ConnectionConfig;
use crate::pool::BufferPool;
use crate::protocol::{BodySize, ParseError, RequestEvent, RequestHead};

/// A complete request head plus whatever body was already buffered.
pub(crate) struct HeadParts {
    pub head: RequestHead,
    pub body_size: BodySize,
    pub preloaded: VecDeque<Bytes>,
    pub complete: bool,
}

pub(crate) struct RequestReader<R> {
    io: R,
    pool: Arc<BufferPool>,
    decoder: RequestDecoder,
    buf: Option<BytesMut>,
    input_buffer_size: usize,
    input_shutdown: bool,
}

impl<R> RequestReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(io: R, pool: Arc<BufferPool>, config: &ConnectionConfig) -> Self {
        Self {
            io,
            pool,
            decoder: RequestDecoder::with_limits(config.get_max_header_bytes(), config.get_max_header_count()),
            buf: None,
            input_buffer_size: config.get_input_buffer_size(),
            input_shutdown: false,
        }
    }

    pub(crate) fn decoder(&self) -> &RequestDecoder {
        &self.decoder
    }

    pub(crate) fn decoder_mut(&mut self) -> &mut RequestDecoder {
        &mut self.decoder
    }

    /// Reads until a request head is complete.
    ///
    /// Body content that already sits in the buffer is decoded greedily
    /// before returning, so the expectation check sees how much of the body
    /// arrived on its own and a fully-buffered message completes without
    /// another fill. `Ok(None)` is a clean EOF on an idle connection.
    pub(crate) async fn read_head(&mut self) -> Result<Option<HeadParts>, ParseError> {
        loop {
            if let Some(buf) = self.buf.as_mut() {
                match self.decoder.decode(buf)? {
                    Some(RequestEvent::Head(head, body_size)) => {
                        let mut preloaded = VecDeque::new();
                        let mut complete = false;
                        while let Some(event) = self.decoder.decode(buf)? {
                            match event {
                                RequestEvent::Content(bytes) => preloaded.push_back(bytes),
                                RequestEvent::End => {
                                    complete = true;
                                    break;
                                }
                                RequestEvent::Head(..) => {
                                    return Err(ParseError::invalid_body("head event while decoding content"))
                                }
                            }
                        }
                        if complete {
                            self.release_if_empty();
                        }
                        return Ok(Some(HeadParts { head, body_size, preloaded, complete }));
                    }
                    Some(_) => return Err(ParseError::invalid_body("body event before a request head")),
                    None => {}
                }
            }

            if self.input_shutdown {
                return Err(ParseError::UnexpectedEof);
            }

            let filled = self.fill().await?;
            trace!(filled, "filled request buffer");
            if filled == 0 {
                // idle means EOF between messages, which is how connections end
                let idle = self.decoder.is_start() && self.buffer_is_empty();
                self.input_shutdown = true;
                self.decoder.shutdown_input();
                self.release_if_empty();
                if idle {
                    debug!("connection closed by peer while idle");
                    return Ok(None);
                }
                return Err(ParseError::UnexpectedEof);
            }
        }
    }

    /// Decodes the next body chunk, filling from the transport as needed.
    /// `Ok(None)` means the message completed.
    pub(crate) async fn next_content(&mut self) -> Result<Option<Bytes>, ParseError> {
        loop {
            if self.decoder.is_complete() {
                return Ok(None);
            }

            if let Some(buf) = self.buf.as_mut() {
                match self.decoder.decode(buf)? {
                    Some(RequestEvent::Content(bytes)) => return Ok(Some(bytes)),
                    Some(RequestEvent::End) => {
                        // all parsed content is consumed, the buffer can go
                        self.release_if_empty();
                        return Ok(None);
                    }
                    Some(RequestEvent::Head(..)) => {
                        return Err(ParseError::invalid_body("head event while decoding content"))
                    }
                    None => {}
                }
            }

            if self.input_shutdown {
                self.decoder.shutdown_input();
                return Err(ParseError::UnexpectedEof);
            }

            let filled = self.fill().await?;
            if filled == 0 {
                debug!("eof in the middle of a request body");
                self.input_shutdown = true;
                self.decoder.shutdown_input();
                return Err(ParseError::UnexpectedEof);
            }
        }
    }

    /// Discards the rest of the current body so the next request starts at
    /// a message boundary.
    pub(crate) async fn drain_body(&mut self) -> Result<(), ParseError> {
        while self.decoder.in_content() {
            if self.next_content().await?.is_none() {
                break;
            }
        }
        self.release_if_empty();
        Ok(())
    }

    async fn fill(&mut self) -> Result<usize, ParseError> {
        let mut size = self.input_buffer_size;
        // a body bigger than the buffer gets a bigger buffer
        if let Some(remaining) = self.decoder.content_remaining() {
            if remaining > size as u64 {
                size *= 4;
            }
        }

        let pool = &self.pool;
        let buf = self.buf.get_or_insert_with(|| pool.acquire(size));
        Ok(self.io.read_buf(buf).await?)
    }

    pub(crate) fn buffer_is_empty(&self) -> bool {
        self.buf.as_ref().map_or(true, |buf| buf.is_empty())
    }

    /// Returns the buffer to the pool if it holds no unconsumed bytes.
    pub(crate) fn release_if_empty(&mut self) {
        if self.buffer_is_empty() {
            if let Some(buf) = self.buf.take() {
                self.pool.release(buf);
            }
        }
    }

    /// Hands any unconsumed bytes to whoever takes over the transport.
    pub(crate) fn take_leftover(&mut self) -> Bytes {
        match self.buf.take() {
            Some(buf) if !buf.is_empty() => buf.freeze(),
            Some(buf) => {
                self.pool.release(buf);
                Bytes::new()
            }
            None => Bytes::new(),
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.io
    }
}
