//! Response head types handed to the generator.

use http::{Response, StatusCode, Version};

use crate::protocol::BodySize;

/// The header portion of an HTTP response: `http::Response<()>` with an
/// empty body placeholder.
pub type ResponseHead = Response<()>;

/// Everything the response generator needs to commit a response: the head
/// plus the declared body framing.
#[derive(Debug)]
pub struct ResponseInfo {
    head: ResponseHead,
    body_size: BodySize,
}

impl ResponseInfo {
    pub fn new(head: ResponseHead, body_size: BodySize) -> Self {
        Self { head, body_size }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn body_size(&self) -> BodySize {
        self.body_size
    }
}
