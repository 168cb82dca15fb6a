//! Error types for connection driving.
//!
//! [`HttpError`] is the error surfaced by a connection's `process` loop; it
//! wraps either a [`ParseError`] from the inbound half or a [`SendError`]
//! from the outbound half. EOF on an idle connection is not an error and is
//! reported as a clean shutdown instead.

use std::io;
use thiserror::Error;

/// Top-level error for a connection lifecycle.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The inbound request could not be parsed or read.
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    /// The outbound response could not be generated or written.
    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Errors raised while reading and parsing a request.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk framing: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// The peer closed the stream in the middle of a message.
    #[error("unexpected eof while reading request")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(reason: S) -> Self {
        Self::InvalidChunk { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// True when no response should be attempted for this error, because the
    /// transport itself already failed.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::UnexpectedEof)
    }
}

/// Errors raised while generating and writing a response.
#[derive(Error, Debug)]
pub enum SendError {
    /// A content write was issued on a response whose head has not been
    /// committed, or some other sequencing rule was broken.
    #[error("illegal response state: {reason}")]
    IllegalState { reason: String },

    /// The bytes written do not match the declared `Content-Length`.
    #[error("content-length mismatch: declared {declared}, wrote {written}")]
    LengthMismatch { declared: u64, written: u64 },

    /// The peer went away while the response was being written.
    #[error("unexpected eof while writing response")]
    UnexpectedEof,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn illegal_state<S: ToString>(reason: S) -> Self {
        Self::IllegalState { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Maps transport write failures onto the closed-channel shape: a peer that
/// vanished mid-response surfaces as an EOF-equivalent error, everything else
/// stays an I/O error.
impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::WriteZero => HttpError::ResponseError { source: SendError::UnexpectedEof },
            _ => HttpError::ResponseError { source: SendError::Io { source: e } },
        }
    }
}
