use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use crate::protocol::body::body_channel::{body_channel, BodyReceiver, BodySender};
use crate::protocol::{BodySize, ParseError};

/// The request body handed to the handler.
///
/// Already-buffered content decoded during head parsing is served first;
/// anything beyond that is pulled on demand from the connection through the
/// body channel.
pub struct ReqBody {
    inner: ReqBodyRepr,
}

enum ReqBodyRepr {
    Receiver(BodyReceiver),
    NoBody,
}

impl ReqBody {
    /// Builds the handler-facing body and, when bytes are still owed by the
    /// transport, the connection-side sender that will serve them.
    pub(crate) fn new(
        preloaded: VecDeque<Bytes>,
        complete: bool,
        size: BodySize,
    ) -> (ReqBody, Option<BodySender>) {
        if size.is_empty() || (complete && preloaded.is_empty()) {
            return (ReqBody::no_body(), None);
        }

        if complete {
            return (ReqBody { inner: ReqBodyRepr::Receiver(BodyReceiver::preloaded(preloaded, size)) }, None);
        }

        let (receiver, sender) = body_channel(preloaded, size);
        (ReqBody { inner: ReqBodyRepr::Receiver(receiver) }, Some(sender))
    }

    pub(crate) fn no_body() -> Self {
        Self { inner: ReqBodyRepr::NoBody }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match &mut this.inner {
            ReqBodyRepr::Receiver(body_receiver) => Pin::new(body_receiver).poll_frame(cx),
            ReqBodyRepr::NoBody => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            ReqBodyRepr::NoBody => true,
            ReqBodyRepr::Receiver(body_receiver) => body_receiver.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            ReqBodyRepr::NoBody => SizeHint::with_exact(0),
            ReqBodyRepr::Receiver(body_receiver) => body_receiver.size_hint(),
        }
    }
}
