use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method, Request, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{BodySize, ParseError, RequestHead};

pub(crate) const MAX_HEADER_NUM: usize = 64;
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a request head (request line plus header fields) into a
/// [`RequestHead`] and the body framing it declares.
///
/// An HTTP/0.9 simple request (`GET <uri>\r\n`, no version token, no
/// headers) is recognized before the regular parser runs.
pub struct HeaderDecoder {
    max_header_bytes: usize,
    max_header_count: usize,
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self { max_header_bytes: MAX_HEADER_BYTES, max_header_count: MAX_HEADER_NUM }
    }
}

impl HeaderDecoder {
    pub fn new(max_header_bytes: usize, max_header_count: usize) -> Self {
        Self { max_header_bytes, max_header_count: max_header_count.min(MAX_HEADER_NUM) }
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHead, BodySize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // The request line must be complete before we can tell a simple
        // request from a versioned one.
        let newline = match src.iter().position(|b| *b == b'\n') {
            Some(at) => at,
            None => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
        };

        let line = trim_cr(&src[..newline]);
        if !contains_version_token(line) {
            return self.decode_simple_request(src, newline).map(Some);
        }

        let mut req = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            unsafe { MaybeUninit::uninit().assume_init() };

        let parsed_result = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed request head");
                ensure!(head_size <= self.max_header_bytes, ParseError::too_large_header(head_size, self.max_header_bytes));
                ensure!(req.headers.len() <= self.max_header_count, ParseError::too_many_headers(self.max_header_count));

                // compute the header bytes index before the source is split
                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, req.headers, &mut header_index);

                let version = match req.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let mut head_builder = Request::builder()
                    .method(req.method.ok_or(ParseError::InvalidMethod)?)
                    .uri(req.path.ok_or(ParseError::InvalidUri)?)
                    .version(version);

                let header_count = req.headers.len();
                let headers = head_builder.headers_mut().ok_or(ParseError::InvalidUri)?;
                headers.reserve(header_count);

                let head_bytes = src.split_to(head_size).freeze();
                for index in &header_index[..header_count] {
                    // httparse has verified the name is valid ASCII
                    let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1])
                        .map_err(ParseError::invalid_header)?;

                    // SAFETY: httparse already checks header value is only visible ASCII bytes,
                    // from_maybe_shared_unchecked contains debug assertions so they are omitted here
                    let value = unsafe {
                        HeaderValue::from_maybe_shared_unchecked(head_bytes.slice(index.value.0..index.value.1))
                    };

                    headers.append(name, value);
                }

                let head =
                    RequestHead::from(head_builder.body(()).map_err(|e| ParseError::invalid_header(e.to_string()))?);
                let body_size = parse_body_size(&head)?;

                Ok(Some((head, body_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                Ok(None)
            }
        }
    }
}

impl HeaderDecoder {
    /// `GET <uri>` with no version token and no header section.
    fn decode_simple_request(&self, src: &mut BytesMut, newline: usize) -> Result<(RequestHead, BodySize), ParseError> {
        let line = src.split_to(newline + 1).freeze();
        let line = trim_cr(&line[..newline]);
        let mut tokens = line.split(|b| *b == b' ').filter(|t| !t.is_empty());

        let method = tokens.next().ok_or(ParseError::InvalidMethod)?;
        ensure!(method == b"GET", ParseError::InvalidMethod);

        let uri = tokens.next().ok_or(ParseError::InvalidUri)?;
        ensure!(tokens.next().is_none(), ParseError::InvalidUri);

        let head = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .version(Version::HTTP_09)
            .body(())
            .map_err(|_| ParseError::InvalidUri)?;

        trace!("parsed simple request head");
        Ok((RequestHead::from(head), BodySize::Empty))
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn contains_version_token(line: &[u8]) -> bool {
    line.windows(6).any(|window| window == b" HTTP/")
}

#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            index.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            index.value = (value_start, value_end);
        }
    }
}

/// Body framing per RFC 7230 section 3.3: a chunked `Transfer-Encoding`
/// wins, otherwise `Content-Length`, otherwise no body. Both present is an
/// error.
fn parse_body_size(head: &RequestHead) -> Result<BodySize, ParseError> {
    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(BodySize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(BodySize::Chunked)
            } else {
                Ok(BodySize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 {
                Ok(BodySize::Empty)
            } else {
                Ok(BodySize::Length(length))
            }
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }
    }
}

fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    header_value
        .and_then(|value| value.to_str().ok())
        .and_then(|encodings| encodings.rsplit(',').next())
        .map(|last_encoding| last_encoding.trim() == "chunked")
        .unwrap_or(false)
}
