//! Response generation state machine.
//!
//! The generator never touches the transport. Each call to
//! [`ResponseGenerator::generate`] inspects the buffers it was offered and
//! answers with the one thing the caller must do next: supply a header
//! buffer, supply a chunk-framing buffer, flush what has been encoded, shut
//! down the output, or nothing at all. The write driver loops on that
//! answer, which is what keeps buffer acquisition and transport writes out
//! of the protocol logic.
//!
//! States run `Start -> Committed -> Completing -> End` once per response
//! and are rewound by [`ResponseGenerator::reset`] for the next one on a
//! persistent connection.

use bytes::BytesMut;
use http::Version;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::body::{ChunkedEncoder, LengthEncoder};
use crate::codec::header::{EncodeHead, HeaderEncoder};
use crate::protocol::{BodySize, ResponseInfo, SendError};

/// Capacity requested for the chunk-framing buffer. Framing lines are tiny;
/// the buffer grows on its own in the degenerate case.
pub const CHUNK_SIZE: usize = 16;

/// What the caller must do next to make the response progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generate {
    /// A header buffer is required before the head can be encoded.
    NeedHeader,
    /// A chunk-framing buffer is required before content can be framed.
    NeedChunk,
    /// Encoded bytes are ready: write `[header, chunk, content]` now.
    Flush,
    /// The response is complete and not persistent: shut down the output.
    ShutdownOut,
    /// This call's work is finished.
    Done,
    /// Internal progress was made; call again.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Committed,
    Completing,
    End,
}

enum BodyCoding {
    None,
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// HTTP/0.9: raw bytes, delimited by connection close.
    Raw,
}

pub struct ResponseGenerator {
    state: State,
    coding: BodyCoding,
    header_encoder: HeaderEncoder,
    persistent: bool,
    shutdown_emitted: bool,
    send_server_version: bool,
}

impl ResponseGenerator {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            coding: BodyCoding::None,
            header_encoder: HeaderEncoder,
            persistent: true,
            shutdown_emitted: false,
            send_server_version: false,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    pub fn set_send_server_version(&mut self, enabled: bool) {
        self.send_server_version = enabled;
    }

    /// Ready for the next response. Persistence is re-decided per request,
    /// so it snaps back to true here.
    pub fn reset(&mut self) {
        self.state = State::Start;
        self.coding = BodyCoding::None;
        self.persistent = true;
        self.shutdown_emitted = false;
    }

    /// Advances the response by one step.
    ///
    /// `info` is required until the head is committed and ignored after;
    /// `content_len` is the length of the content the caller wants written
    /// in this step (0 for none); `last` marks the final content of the
    /// response.
    pub fn generate(
        &mut self,
        info: Option<&ResponseInfo>,
        header: Option<&mut BytesMut>,
        chunk: Option<&mut BytesMut>,
        content_len: usize,
        last: bool,
    ) -> Result<Generate, SendError> {
        match self.state {
            State::Start => {
                let header = match header {
                    Some(header) => header,
                    None => return Ok(Generate::NeedHeader),
                };
                let info = match info {
                    Some(info) => info,
                    None => return Err(SendError::illegal_state("response head is not committed yet")),
                };

                self.coding = match info.body_size() {
                    BodySize::Empty => BodyCoding::None,
                    BodySize::Length(n) => BodyCoding::Length(LengthEncoder::new(n)),
                    BodySize::Chunked => BodyCoding::Chunked(ChunkedEncoder::new()),
                };
                if info.version() == Version::HTTP_09 {
                    self.coding = BodyCoding::Raw;
                }

                self.header_encoder.encode(EncodeHead { info, send_server_version: self.send_server_version }, header)?;
                trace!(status = %info.status(), "committed response head");
                self.state = State::Committed;
                Ok(Generate::Continue)
            }

            State::Committed => {
                if content_len > 0 {
                    match &mut self.coding {
                        BodyCoding::Chunked(encoder) => {
                            let chunk = match chunk {
                                Some(chunk) => chunk,
                                None => return Ok(Generate::NeedChunk),
                            };
                            encoder.frame_prefix(content_len, chunk)?;
                        }
                        BodyCoding::Length(encoder) => encoder.note(content_len)?,
                        BodyCoding::None => {
                            return Err(SendError::invalid_body("content written on a response declared empty"))
                        }
                        BodyCoding::Raw => {}
                    }
                    if last {
                        self.state = State::Completing;
                    }
                    return Ok(Generate::Flush);
                }

                if last {
                    self.state = State::Completing;
                    return Ok(Generate::Continue);
                }

                // Head (and any content so far) is out; nothing more to do
                // for this call.
                Ok(Generate::Done)
            }

            State::Completing => match &mut self.coding {
                BodyCoding::Chunked(encoder) => {
                    let chunk = match chunk {
                        Some(chunk) => chunk,
                        None => return Ok(Generate::NeedChunk),
                    };
                    encoder.frame_last(chunk)?;
                    self.state = State::End;
                    Ok(Generate::Flush)
                }
                BodyCoding::Length(encoder) => {
                    encoder.finish()?;
                    self.state = State::End;
                    Ok(Generate::Continue)
                }
                BodyCoding::None | BodyCoding::Raw => {
                    self.state = State::End;
                    Ok(Generate::Continue)
                }
            },

            State::End => {
                if !self.persistent && !self.shutdown_emitted {
                    self.shutdown_emitted = true;
                    return Ok(Generate::ShutdownOut);
                }
                Ok(Generate::Done)
            }
        }
    }
}
