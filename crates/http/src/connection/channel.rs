//! Per-request exchange state.
//!
//! One [`Exchange`] is built from each parsed request head. It carries the
//! persistence decision, the pending `100-continue` expectation, the HEAD
//! flag, the `Connection` header the response must announce, and the armed
//! upgrade channel when the request asked for one. It lives exactly as long
//! as its request/response cycle and is gone after completion.

use http::{HeaderValue, StatusCode, Version};

use crate::connection::upgrade;
use crate::headers;
use crate::protocol::{ParseError, RequestHead};

pub(crate) struct Exchange {
    pub version: Version,
    pub persistent: bool,
    pub expect_continue: bool,
    pub head_request: bool,
    /// `Connection` header value owed to the response, if any.
    pub announce: Option<HeaderValue>,
    pub upgrade: Option<upgrade::Pending>,
    pub response_status: Option<StatusCode>,
}

impl Exchange {
    /// Decides persistence from the request version and `Connection` header.
    ///
    /// `body_available` and `body_complete` describe how much of the body
    /// arrived together with the head; a client that already sent body
    /// bytes is not waiting on its expectation.
    pub(crate) fn on_head(head: &RequestHead, body_available: bool, body_complete: bool) -> Result<Self, ParseError> {
        let version = head.version();
        let (persistent, announce) = match version {
            Version::HTTP_09 => (false, None),
            Version::HTTP_10 => {
                let persistent = headers::connection_keep_alive(head.headers()) || head.is_connect();
                let announce = persistent.then(|| HeaderValue::from_static("keep-alive"));
                (persistent, announce)
            }
            Version::HTTP_11 => {
                let persistent = !headers::connection_close(head.headers()) || head.is_connect();
                let announce = (!persistent).then(|| HeaderValue::from_static("close"));
                (persistent, announce)
            }
            v => return Err(ParseError::invalid_header(format!("cannot speak http version {v:?}"))),
        };

        let expect_continue = head.expects_continue() && !body_available && !body_complete;

        Ok(Self {
            version,
            persistent,
            expect_continue,
            head_request: head.is_head(),
            announce,
            upgrade: None,
            response_status: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Request};
    use crate::protocol::RequestHead;

    fn head(version: Version, connection: Option<&str>) -> RequestHead {
        let mut builder = Request::builder().method(Method::GET).uri("/").version(version);
        if let Some(value) = connection {
            builder = builder.header("connection", value);
        }
        RequestHead::from(builder.body(()).unwrap())
    }

    #[test]
    fn http09_is_never_persistent() {
        let exchange = Exchange::on_head(&head(Version::HTTP_09, None), false, true).unwrap();
        assert!(!exchange.persistent);
        assert!(exchange.announce.is_none());
    }

    #[test]
    fn http10_needs_explicit_keep_alive() {
        let exchange = Exchange::on_head(&head(Version::HTTP_10, None), false, true).unwrap();
        assert!(!exchange.persistent);

        let exchange = Exchange::on_head(&head(Version::HTTP_10, Some("keep-alive")), false, true).unwrap();
        assert!(exchange.persistent);
        assert_eq!(exchange.announce.as_ref().map(|v| v.as_bytes()), Some(&b"keep-alive"[..]));
    }

    #[test]
    fn http11_is_persistent_unless_closed() {
        let exchange = Exchange::on_head(&head(Version::HTTP_11, None), false, true).unwrap();
        assert!(exchange.persistent);
        assert!(exchange.announce.is_none());

        let exchange = Exchange::on_head(&head(Version::HTTP_11, Some("close")), false, true).unwrap();
        assert!(!exchange.persistent);
        assert_eq!(exchange.announce.as_ref().map(|v| v.as_bytes()), Some(&b"close"[..]));
    }

    #[test]
    fn connect_keeps_the_tunnel_open() {
        let head = RequestHead::from(
            Request::builder()
                .method(Method::CONNECT)
                .uri("example.com:443")
                .version(Version::HTTP_11)
                .header("connection", "close")
                .body(())
                .unwrap(),
        );
        let exchange = Exchange::on_head(&head, false, true).unwrap();
        assert!(exchange.persistent);
    }

    #[test]
    fn expectation_is_dropped_when_body_already_arrived() {
        let head = RequestHead::from(
            Request::builder()
                .method(Method::POST)
                .uri("/")
                .header("expect", "100-continue")
                .header("content-length", "5")
                .body(())
                .unwrap(),
        );

        let waiting = Exchange::on_head(&head, false, false).unwrap();
        assert!(waiting.expect_continue);

        let already_sending = Exchange::on_head(&head, true, false).unwrap();
        assert!(!already_sending.expect_continue);
    }
}
