use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{header, StatusCode, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{BodySize, ResponseInfo, SendError};

const INIT_HEADER_SIZE: usize = 4 * 1024;

const SERVER_TOKEN: &str = concat!("lean-http/", env!("CARGO_PKG_VERSION"));

/// Encodes a response head: status line, caller headers, then the framing
/// header derived from the declared body size.
///
/// Any `Content-Length` or `Transfer-Encoding` the caller set is dropped in
/// favor of the declared framing, so the head on the wire always matches
/// what the body encoders will actually produce. An HTTP/0.9 exchange has
/// no head at all and encodes to nothing.
pub struct HeaderEncoder;

/// One response head together with the ambient encoding switches.
pub struct EncodeHead<'a> {
    pub info: &'a ResponseInfo,
    pub send_server_version: bool,
}

impl Encoder<EncodeHead<'_>> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: EncodeHead<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let info = item.info;

        dst.reserve(INIT_HEADER_SIZE);
        match info.version() {
            Version::HTTP_09 => return Ok(()),
            Version::HTTP_10 => dst.put_slice(b"HTTP/1.0 "),
            Version::HTTP_11 => dst.put_slice(b"HTTP/1.1 "),
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::illegal_state(format!("cannot encode a {v:?} response")));
            }
        }

        dst.put_slice(info.status().as_str().as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(info.status().canonical_reason().unwrap_or("").as_bytes());
        dst.put_slice(b"\r\n");

        for (header_name, header_value) in info.head().headers().iter() {
            if *header_name == header::CONTENT_LENGTH || *header_name == header::TRANSFER_ENCODING {
                continue;
            }
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }

        if item.send_server_version && !info.head().headers().contains_key(header::SERVER) {
            dst.put_slice(b"server: ");
            dst.put_slice(SERVER_TOKEN.as_bytes());
            dst.put_slice(b"\r\n");
        }

        match info.body_size() {
            BodySize::Length(n) => {
                write!(Writer(dst), "content-length: {n}\r\n")?;
            }
            BodySize::Chunked => dst.put_slice(b"transfer-encoding: chunked\r\n"),
            BodySize::Empty => {
                if declares_content_length(info.status()) {
                    dst.put_slice(b"content-length: 0\r\n");
                }
            }
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// 1xx, 204 and 304 responses never carry a body, so announcing
/// `content-length: 0` on them would be wrong.
fn declares_content_length(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

struct Writer<'a>(&'a mut BytesMut);

impl std::io::Write for Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
