//! The outbound half of a connection.
//!
//! Two flows share one loop shape: `commit` writes the first bytes of a
//! response (and so may need a header buffer), `write_content` writes every
//! later piece. Each iteration asks the generator what it needs, supplies
//! buffers from the pool, and on `Flush` scatter-writes the non-empty subset
//! of `[header, chunk, content]` without copying the content.
//!
//! The header buffer is normally pooled, but when the final content chunk is
//! a uniquely owned heap buffer with enough spare tail capacity, the header
//! is carved out of that spare space instead; such a buffer belongs to the
//! content's allocation and must never be returned to the pool.

use std::io::{self, IoSlice};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::{Generate, ResponseGenerator, CHUNK_SIZE};
use crate::config::ConnectionConfig;
use crate::pool::BufferPool;
use crate::protocol::{ResponseInfo, SendError};

pub(crate) struct ResponseWriter<W> {
    io: W,
    pool: Arc<BufferPool>,
    generator: ResponseGenerator,
    chunk: Option<BytesMut>,
    response_header_size: usize,
    head_request: bool,
    output_shutdown: bool,
}

struct HeaderBuf {
    buf: BytesMut,
    /// False when the buffer aliases the tail of a content buffer; the
    /// backing storage is not ours to pool.
    pooled: bool,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(io: W, pool: Arc<BufferPool>, config: &ConnectionConfig) -> Self {
        let mut generator = ResponseGenerator::new();
        generator.set_send_server_version(config.get_send_server_version());
        Self {
            io,
            pool,
            generator,
            chunk: None,
            response_header_size: config.get_response_header_size(),
            head_request: false,
            output_shutdown: false,
        }
    }

    pub(crate) fn generator(&self) -> &ResponseGenerator {
        &self.generator
    }

    pub(crate) fn generator_mut(&mut self) -> &mut ResponseGenerator {
        &mut self.generator
    }

    pub(crate) fn is_output_shutdown(&self) -> bool {
        self.output_shutdown
    }

    /// First write of a response: commits the head, and with it as much
    /// content as was offered.
    pub(crate) async fn commit(
        &mut self,
        info: ResponseInfo,
        content: Option<Bytes>,
        last: bool,
        head_request: bool,
    ) -> Result<(), SendError> {
        self.head_request = head_request;
        let mut content = content.filter(|c| !c.is_empty());
        let mut header: Option<HeaderBuf> = None;

        loop {
            let content_len = content.as_ref().map_or(0, Bytes::len);
            let step = self.generator.generate(
                Some(&info),
                header.as_mut().map(|h| &mut h.buf),
                self.chunk.as_mut(),
                content_len,
                last,
            )?;
            trace!(?step, content_len, last, "commit step");

            match step {
                Generate::NeedHeader => header = Some(self.acquire_header(&mut content, last)),
                Generate::NeedChunk => self.chunk = Some(self.pool.acquire(CHUNK_SIZE)),
                Generate::Flush => {
                    if self.head_request {
                        // the head reflects what a GET would have carried,
                        // but no body bytes go on the wire
                        if let Some(chunk) = self.chunk.as_mut() {
                            chunk.clear();
                        }
                        content = None;
                    }
                    self.flush_parts(header.as_mut().map(|h| &mut h.buf), content.as_mut()).await?;
                    content = None;
                }
                Generate::ShutdownOut => self.shutdown_output().await?,
                Generate::Done => {
                    if let Some(header) = header.take() {
                        if header.pooled {
                            self.pool.release(header.buf);
                        }
                    }
                    return Ok(());
                }
                Generate::Continue => {}
            }
        }
    }

    /// Any write after the first. Asking for a header here means the caller
    /// never committed, which is a sequencing bug, not an I/O condition.
    pub(crate) async fn write_content(&mut self, content: Option<Bytes>, last: bool) -> Result<(), SendError> {
        let mut content = content.filter(|c| !c.is_empty());

        loop {
            let content_len = content.as_ref().map_or(0, Bytes::len);
            let step = self.generator.generate(None, None, self.chunk.as_mut(), content_len, last)?;
            trace!(?step, content_len, last, "content step");

            match step {
                Generate::NeedHeader => {
                    return Err(SendError::illegal_state("content write on an uncommitted response"))
                }
                Generate::NeedChunk => self.chunk = Some(self.pool.acquire(CHUNK_SIZE)),
                Generate::Flush => {
                    if self.head_request {
                        if let Some(chunk) = self.chunk.as_mut() {
                            chunk.clear();
                        }
                        content = None;
                        continue;
                    }
                    self.flush_parts(None, content.as_mut()).await?;
                    content = None;
                }
                Generate::ShutdownOut => self.shutdown_output().await?,
                Generate::Done => return Ok(()),
                Generate::Continue => {}
            }
        }
    }

    /// Interim response for a pending `Expect: 100-continue`.
    pub(crate) async fn send_continue(&mut self) -> Result<(), SendError> {
        trace!("sending 100 continue");
        self.io.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(map_write_error)?;
        self.io.flush().await.map_err(map_write_error)?;
        Ok(())
    }

    /// Half-closes the write direction, once.
    pub(crate) async fn shutdown_output(&mut self) -> Result<(), SendError> {
        if self.output_shutdown {
            return Ok(());
        }
        trace!("shutting down response output");
        self.output_shutdown = true;
        self.io.shutdown().await.map_err(map_write_error)?;
        Ok(())
    }

    /// Drops the chunk-framing buffer back into the pool. Called on
    /// connection reset; within one response the buffer is reused across
    /// writes.
    pub(crate) fn release_chunk(&mut self) {
        if let Some(chunk) = self.chunk.take() {
            self.pool.release(chunk);
        }
    }

    pub(crate) fn into_inner(self) -> W {
        self.io
    }

    fn acquire_header(&self, content: &mut Option<Bytes>, last: bool) -> HeaderBuf {
        if last {
            if let Some(bytes) = content.take() {
                match bytes.try_into_mut() {
                    Ok(mut owned) => {
                        if owned.capacity() - owned.len() > self.response_header_size {
                            let tail = owned.split_off(owned.len());
                            *content = Some(owned.freeze());
                            trace!("carved header buffer from spare content capacity");
                            return HeaderBuf { buf: tail, pooled: false };
                        }
                        *content = Some(owned.freeze());
                    }
                    Err(shared) => *content = Some(shared),
                }
            }
        }
        HeaderBuf { buf: self.pool.acquire(self.response_header_size), pooled: true }
    }

    async fn flush_parts(
        &mut self,
        header: Option<&mut BytesMut>,
        content: Option<&mut Bytes>,
    ) -> Result<(), SendError> {
        let mut parts: [Option<&mut (dyn Buf + Send)>; 3] = [
            header.map(|h| h as &mut (dyn Buf + Send)),
            self.chunk.as_mut().map(|c| c as &mut (dyn Buf + Send)),
            content.map(|c| c as &mut (dyn Buf + Send)),
        ];

        if parts.iter().all(|p| p.as_ref().map_or(true, |b| !b.has_remaining())) {
            return Ok(());
        }

        write_all_vectored(&mut self.io, &mut parts).await.map_err(map_write_error)?;
        self.io.flush().await.map_err(map_write_error)?;
        Ok(())
    }
}

/// Scatter-writes every buffer to completion, in order.
async fn write_all_vectored<W>(io: &mut W, parts: &mut [Option<&mut (dyn Buf + Send)>; 3]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let slices: Vec<IoSlice<'_>> = parts
            .iter()
            .flatten()
            .filter(|buf| buf.has_remaining())
            .map(|buf| IoSlice::new(buf.chunk()))
            .collect();
        if slices.is_empty() {
            return Ok(());
        }

        let mut written = io.write_vectored(&slices).await?;
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }

        for part in parts.iter_mut().flatten() {
            let advance = written.min(part.remaining());
            part.advance(advance);
            written -= advance;
            if written == 0 {
                break;
            }
        }
    }
}

fn map_write_error(e: io::Error) -> SendError {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::WriteZero => {
            SendError::UnexpectedEof
        }
        _ => SendError::Io { source: e },
    }
}
