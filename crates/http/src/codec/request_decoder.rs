//! Incremental request decoder.
//!
//! [`RequestDecoder`] is the stateful front of the inbound half: it runs the
//! header decoder until a head is complete, then the payload decoder chosen
//! by that head until the message ends. One connection owns one decoder and
//! rewinds it with [`RequestDecoder::reset`] between messages; a connection
//! that will not read another request calls [`RequestDecoder::close`], after
//! which all further input is discarded on the way to EOF.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{ParseError, RequestEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for (more of) a request head.
    Start,
    /// Head seen, body not finished.
    Content,
    /// Message complete, waiting for `reset`.
    Complete,
    /// Seeking EOF; input is discarded.
    Discard,
}

pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    phase: Phase,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_limits(max_header_bytes: usize, max_header_count: usize) -> Self {
        Self {
            header_decoder: HeaderDecoder::new(max_header_bytes, max_header_count),
            payload_decoder: None,
            phase: Phase::Start,
        }
    }

    /// No part of a message has been decoded.
    pub fn is_start(&self) -> bool {
        self.phase == Phase::Start
    }

    /// A head was decoded and the body has not ended yet.
    pub fn in_content(&self) -> bool {
        self.phase == Phase::Content
    }

    /// The current message is complete.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Rewinds for the next message on a persistent connection.
    pub fn reset(&mut self) {
        self.phase = Phase::Start;
        self.payload_decoder = None;
    }

    /// Stops decoding for good; everything fed in afterwards is discarded.
    pub fn close(&mut self) {
        self.phase = Phase::Discard;
        self.payload_decoder = None;
    }

    /// The input half is gone. Anything short of a complete message cannot
    /// finish now, so the decoder falls into discard mode unless it already
    /// completed.
    pub fn shutdown_input(&mut self) {
        if self.phase != Phase::Complete {
            self.close();
        }
    }

    /// Declared body bytes not yet decoded, when the framing knows.
    pub fn content_remaining(&self) -> Option<u64> {
        self.payload_decoder.as_ref().and_then(|decoder| decoder.remaining_length())
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder::default(), payload_decoder: None, phase: Phase::Start }
    }
}

impl Decoder for RequestDecoder {
    type Item = RequestEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.phase {
            Phase::Discard => {
                src.clear();
                Ok(None)
            }

            Phase::Complete => Ok(None),

            Phase::Content => {
                let payload_decoder = match &mut self.payload_decoder {
                    Some(decoder) => decoder,
                    None => return Err(ParseError::invalid_body("content phase without a payload decoder")),
                };

                match payload_decoder.decode(src)? {
                    Some(RequestEvent::End) => {
                        self.phase = Phase::Complete;
                        self.payload_decoder = None;
                        Ok(Some(RequestEvent::End))
                    }
                    other => Ok(other),
                }
            }

            Phase::Start => match self.header_decoder.decode(src)? {
                Some((head, body_size)) => {
                    self.payload_decoder = Some(body_size.into());
                    self.phase = Phase::Content;
                    Ok(Some(RequestEvent::Head(head, body_size)))
                }
                None => Ok(None),
            },
        }
    }
}
