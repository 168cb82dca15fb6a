use bytes::Bytes;
use http_body::SizeHint;

use crate::protocol::RequestHead;

/// A significant event produced by the request decoder.
///
/// The decoder is incremental: feeding it more bytes produces at most one
/// event per call, in order `Head`, zero or more `Content`, then `End`.
pub enum RequestEvent {
    /// Request line and headers are complete; body framing is decided.
    Head(RequestHead, BodySize),
    /// One decoded chunk of body bytes.
    Content(Bytes),
    /// The message is complete.
    End,
}

impl RequestEvent {
    #[inline]
    pub fn is_head(&self) -> bool {
        matches!(self, RequestEvent::Head(..))
    }

    #[inline]
    pub fn is_content(&self) -> bool {
        matches!(self, RequestEvent::Content(_))
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, RequestEvent::End)
    }
}

/// Body framing of a message, decided from its headers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodySize {
    /// Body with a known length in bytes.
    Length(u64),
    /// Body using chunked transfer encoding.
    Chunked,
    /// No body.
    Empty,
}

impl BodySize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, BodySize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BodySize::Empty)
    }
}

impl From<SizeHint> for BodySize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(0) => BodySize::Empty,
            Some(length) => BodySize::Length(length),
            None => BodySize::Chunked,
        }
    }
}

impl From<BodySize> for SizeHint {
    fn from(size: BodySize) -> Self {
        match size {
            BodySize::Length(length) => SizeHint::with_exact(length),
            BodySize::Chunked => SizeHint::new(),
            BodySize::Empty => SizeHint::with_exact(0),
        }
    }
}
