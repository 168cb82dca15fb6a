//! Unified decoder over the three body framings: fixed length, chunked
//! transfer encoding and no body. The strategy is picked from the message
//! headers and delegated to.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{BodySize, ParseError, RequestEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.kind, Kind::NoBody)
    }

    /// Bytes still owed when the framing has a known length.
    pub fn remaining_length(&self) -> Option<u64> {
        match &self.kind {
            Kind::Length(decoder) => Some(decoder.remaining()),
            _ => None,
        }
    }
}

impl From<BodySize> for PayloadDecoder {
    fn from(size: BodySize) -> Self {
        match size {
            BodySize::Length(length) => PayloadDecoder::fix_length(length),
            BodySize::Chunked => PayloadDecoder::chunked(),
            BodySize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = RequestEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::NoBody => Ok(Some(RequestEvent::End)),
        }
    }
}
