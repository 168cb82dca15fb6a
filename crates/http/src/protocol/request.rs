//! Request head abstraction.
//!
//! Wraps `http::Request<()>` so the decoder can hand over a parsed head
//! before any body bytes exist, and so persistence and expectation checks
//! have one obvious home.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::headers;

/// A parsed request line plus headers, without a body.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHead {
    /// Consumes the head and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, turning this head into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn is_head(&self) -> bool {
        self.method() == Method::HEAD
    }

    pub fn is_connect(&self) -> bool {
        self.method() == Method::CONNECT
    }

    /// Whether the client asked for a `100 Continue` before sending its body.
    pub fn expects_continue(&self) -> bool {
        self.version() > Version::HTTP_10 && headers::expects_continue(self.headers())
    }

    /// Whether the request announces a protocol upgrade intent.
    pub fn wants_upgrade(&self) -> bool {
        headers::connection_upgrade(self.headers())
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
