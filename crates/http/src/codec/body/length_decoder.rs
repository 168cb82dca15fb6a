//! Decoder for `Content-Length` delimited bodies
//! ([RFC 7230 section 3.3.2](https://tools.ietf.org/html/rfc7230#section-3.3.2)).

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, RequestEvent};

/// Tracks the bytes still owed by a fixed-length body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    /// Bytes of body not yet decoded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Decoder for LengthDecoder {
    type Item = RequestEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(RequestEvent::End));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(RequestEvent::Content(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_up_to_the_declared_length() {
        let mut buffer = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut decoder = LengthDecoder::new(10);
        let event = decoder.decode(&mut buffer).unwrap().unwrap();

        match event {
            RequestEvent::Content(bytes) => {
                assert_eq!(&bytes[..], b"1012345678");
            }
            _ => panic!("expected content"),
        }

        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
        assert_eq!(decoder.remaining(), 0);
        assert!(matches!(decoder.decode(&mut buffer), Ok(Some(RequestEvent::End))));
    }

    #[test]
    fn short_buffer_keeps_remaining() {
        let mut buffer = BytesMut::from(&b"abc"[..]);
        let mut decoder = LengthDecoder::new(10);

        match decoder.decode(&mut buffer).unwrap().unwrap() {
            RequestEvent::Content(bytes) => assert_eq!(&bytes[..], b"abc"),
            _ => panic!("expected content"),
        }

        assert_eq!(decoder.remaining(), 7);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
    }
}
