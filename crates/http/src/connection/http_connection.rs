//! The top-level connection driver.
//!
//! One [`HttpConnection`] owns one accepted transport and runs its whole
//! life: parse a request head, hand the request to the handler while pumping
//! body bytes under it on demand, write the response, then decide what the
//! connection does next: parse the next (possibly already buffered,
//! pipelined) request, close, or hand the transport to an upgraded protocol.
//!
//! Requests on one connection are strictly serialized: the next head is not
//! parsed until the previous cycle has completed and reset. A `Connection`
//! task is the only thing touching its transport, so there is no
//! synchronization anywhere in here, only awaits.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::select;
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::connection::reader::{HeadParts, RequestReader};
use crate::connection::upgrade::{self, Upgraded};
use crate::connection::writer::ResponseWriter;
use crate::connection::Exchange;
use crate::handler::Handler;
use crate::pool::BufferPool;
use crate::protocol::body::ReqBody;
use crate::protocol::{BodySize, HttpError, ResponseHead, ResponseInfo, SendError};

/// Drives the HTTP/1.x lifecycle of one transport.
pub struct HttpConnection<S> {
    reader: RequestReader<ReadHalf<S>>,
    writer: ResponseWriter<WriteHalf<S>>,
}

enum Disposition {
    /// Persistent: go parse the next request.
    Next,
    /// Not persistent: the connection is finished.
    Close,
    /// A `101` was sent and someone is waiting for the transport.
    Upgrade(upgrade::Pending),
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(io: S) -> Self {
        Self::with_config(io, ConnectionConfig::default(), Arc::new(BufferPool::default()))
    }

    /// `pool` is shared across connections; `config` is per listener.
    pub fn with_config(io: S, config: ConnectionConfig, pool: Arc<BufferPool>) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        Self {
            reader: RequestReader::new(read_half, pool.clone(), &config),
            writer: ResponseWriter::new(write_half, pool, &config),
        }
    }

    /// Serves requests until the connection ends.
    ///
    /// Returns `Ok(())` on a clean end: peer closed while idle, a
    /// non-persistent exchange finished, or the transport was handed off to
    /// an upgraded protocol.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            let parts = match self.reader.read_head().await {
                Ok(Some(parts)) => parts,
                Ok(None) => {
                    debug!("no more requests, closing the connection down");
                    break;
                }
                Err(e) => {
                    if e.is_io() {
                        // nobody is left to read a response
                        match &e {
                            crate::protocol::ParseError::UnexpectedEof => {
                                warn!("peer went away mid-request, {}", e)
                            }
                            _ => debug!("request read failed, {}", e),
                        }
                    } else {
                        warn!("can't parse next request, replying 400, cause: {}", e);
                        self.writer.generator_mut().set_persistent(false);
                        let _ = self.send_error_response(StatusCode::BAD_REQUEST).await;
                    }
                    return Err(e.into());
                }
            };

            match self.run_exchange(parts, &handler).await? {
                Disposition::Next => continue,
                Disposition::Close => break,
                Disposition::Upgrade(pending) => {
                    debug!("switching protocols, handing the transport off");
                    let HttpConnection { mut reader, writer } = self;
                    let leftover = reader.take_leftover();
                    let io = reader.into_inner().unsplit(writer.into_inner());
                    pending.fulfill(Upgraded::new(io, leftover));
                    return Ok(());
                }
            }
        }

        if !self.writer.is_output_shutdown() {
            let _ = self.writer.shutdown_output().await;
        }
        Ok(())
    }

    async fn run_exchange<H>(&mut self, parts: HeadParts, handler: &Arc<H>) -> Result<Disposition, HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let HeadParts { head, body_size, preloaded, complete } = parts;

        let mut exchange = match Exchange::on_head(&head, !preloaded.is_empty(), complete) {
            Ok(exchange) => exchange,
            Err(e) => {
                warn!("refusing request, cause: {}", e);
                self.writer.generator_mut().set_persistent(false);
                let _ = self.send_error_response(StatusCode::BAD_REQUEST).await;
                return Err(e.into());
            }
        };
        if !exchange.persistent {
            self.writer.generator_mut().set_persistent(false);
        }

        let on_upgrade = if head.wants_upgrade() {
            let (pending, on_upgrade) = upgrade::pending();
            exchange.upgrade = Some(pending);
            Some(on_upgrade)
        } else {
            None
        };

        let (req_body, body_sender) = ReqBody::new(preloaded, complete, body_size);
        let mut request = head.body(req_body);
        if let Some(on_upgrade) = on_upgrade {
            request.extensions_mut().insert(on_upgrade);
        }

        // The handler and the body pump run concurrently: the handler may be
        // waiting for body bytes only the pump can deliver, and the pump
        // only acts when the handler asks.
        let mut body_failed = false;
        let response_result = {
            tokio::pin! {
                let handle_future = handler.call(request);
            }

            match body_sender {
                Some(mut sender) => {
                    tokio::pin! {
                        let pump_future = sender.run(&mut self.reader, &mut self.writer, &mut exchange);
                    }
                    let mut pump_done = false;
                    loop {
                        select! {
                            // the response takes priority once it is ready
                            biased;
                            response = &mut handle_future => break response,
                            result = &mut pump_future, if !pump_done => {
                                pump_done = true;
                                if let Err(e) = result {
                                    warn!("request body pump failed, {}", e);
                                    body_failed = true;
                                }
                            }
                        }
                    }
                }
                None => handle_future.await,
            }
        };

        if body_failed {
            // the stream position is lost, nothing after this request can
            // be trusted
            self.writer.generator_mut().set_persistent(false);
        }

        // The client was never told whether to send its body: once this
        // response goes out, the unsent body cannot be consumed, so the
        // connection must close after it.
        if exchange.expect_continue {
            self.writer.generator_mut().set_persistent(false);
        }

        match response_result {
            Ok(response) => self.send_response(response, &mut exchange).await?,
            Err(e) => {
                error!("handler failed, replying 500, cause: {}", e.into());
                self.writer.generator_mut().set_persistent(false);
                exchange.response_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
                self.send_error_response(StatusCode::INTERNAL_SERVER_ERROR).await?;
            }
        }

        self.completed(exchange).await
    }

    async fn send_response<B>(&mut self, response: Response<B>, exchange: &mut Exchange) -> Result<(), HttpError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let (mut parts, mut body) = response.into_parts();
        exchange.response_status = Some(parts.status);

        // the response speaks the version the request negotiated
        parts.version = match exchange.version {
            Version::HTTP_09 => Version::HTTP_09,
            Version::HTTP_10 => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        if let Some(value) = exchange.announce.take() {
            parts.headers.insert(header::CONNECTION, value);
        }

        let body_size = BodySize::from(body.size_hint());
        let info = ResponseInfo::new(Response::from_parts(parts, ()), body_size);

        // the first data frame rides along with the committed head
        let (first, mut done) = if body.is_end_stream() {
            (None, true)
        } else {
            match body.frame().await {
                None => (None, true),
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        let done = body.is_end_stream();
                        (Some(data), done)
                    }
                    // trailers and unknown frames are not sent
                    Err(_frame) => (None, body.is_end_stream()),
                },
                Some(Err(e)) => {
                    error!("resolve response body error: {}", e);
                    self.writer.generator_mut().set_persistent(false);
                    return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into());
                }
            }
        };

        self.writer.commit(info, first, done, exchange.head_request).await?;

        while !done {
            match body.frame().await {
                None => {
                    done = true;
                    self.writer.write_content(None, true).await?;
                }
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        let last = body.is_end_stream();
                        self.writer.write_content(Some(data), last).await?;
                        done = last;
                    }
                }
                Some(Err(e)) => {
                    error!("resolve response body error: {}", e);
                    self.writer.generator_mut().set_persistent(false);
                    return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into());
                }
            }
        }

        Ok(())
    }

    /// Post-cycle disposition: drain what is left of the request body,
    /// check for a protocol handoff, then reset for the next request.
    async fn completed(&mut self, mut exchange: Exchange) -> Result<Disposition, HttpError> {
        if self.reader.decoder().in_content() && self.writer.generator().is_persistent() && !exchange.expect_continue
        {
            self.reader.drain_body().await.map_err(HttpError::from)?;
        }

        if exchange.response_status == Some(StatusCode::SWITCHING_PROTOCOLS) {
            if let Some(pending) = exchange.upgrade.take() {
                self.reset(&exchange);
                return Ok(Disposition::Upgrade(pending));
            }
        }

        let persistent = self.writer.generator().is_persistent();
        self.reset(&exchange);
        Ok(if persistent { Disposition::Next } else { Disposition::Close })
    }

    fn reset(&mut self, exchange: &Exchange) {
        let decoder = self.reader.decoder_mut();
        if exchange.expect_continue {
            // the body was never requested and never sent; rewind, then
            // seek EOF so nothing stale is ever parsed as a request
            decoder.reset();
            decoder.close();
        } else if self.writer.generator().is_persistent() {
            decoder.reset();
        } else {
            decoder.close();
        }

        self.writer.generator_mut().reset();
        self.reader.release_if_empty();
        self.writer.release_chunk();
    }

    async fn send_error_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let info = ResponseInfo::new(build_error_head(status), BodySize::Empty);
        self.writer.commit(info, None, true, false).await?;
        Ok(())
    }
}

fn build_error_head(status_code: StatusCode) -> ResponseHead {
    Response::builder().status(status_code).body(()).unwrap()
}

impl<S> std::fmt::Debug for HttpConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").finish()
    }
}
