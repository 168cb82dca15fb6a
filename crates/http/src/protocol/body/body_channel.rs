//! Demand-driven channel between the connection task and the request body
//! handed to the handler.
//!
//! The receiver side lives inside the handler's `Request` and implements
//! [`Body`]. It asks for one chunk at a time over the signal channel and the
//! sender answers over the data channel, decoding from the shared request
//! buffer and filling from the transport only when the buffer runs dry.
//! One signal in flight at a time is the whole back-pressure story: the
//! connection never reads ahead of the handler.
//!
//! The sender also owes the client its `100 Continue`: the interim line goes
//! out right before the first fill, and only if no body bytes arrived on
//! their own.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error};

use crate::connection::{Exchange, RequestReader, ResponseWriter};
use crate::protocol::{BodySize, ParseError};

pub(crate) enum BodySignal {
    RequestData,
}

pub(crate) enum BodyFrameItem {
    Chunk(Bytes),
    End,
}

pub(crate) fn body_channel(
    preloaded: VecDeque<Bytes>,
    size: BodySize,
) -> (BodyReceiver, BodySender) {
    let (signal_sender, signal_receiver) = mpsc::channel(8);
    let (data_sender, data_receiver) = mpsc::channel(8);

    let receiver = BodyReceiver {
        preloaded,
        channel: Some(ReceiverChannel { signal_sender, data_receiver, in_flight: false }),
        size,
        ended: false,
    };
    let sender = BodySender { signal_receiver, data_sender, eof: false };
    (receiver, sender)
}

/// The connection-task half: serves one chunk per demand signal.
pub(crate) struct BodySender {
    signal_receiver: mpsc::Receiver<BodySignal>,
    data_sender: mpsc::Sender<Result<BodyFrameItem, ParseError>>,
    eof: bool,
}

impl BodySender {
    /// Runs until the body ends, the handler stops asking (drops its
    /// receiver), or reading fails. A failure is reported on the data
    /// channel for the handler and returned to the connection, which must
    /// treat the stream position as lost.
    pub(crate) async fn run<R, W>(
        &mut self,
        reader: &mut RequestReader<R>,
        writer: &mut ResponseWriter<W>,
        exchange: &mut Exchange,
    ) -> Result<(), ParseError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.eof {
            return Ok(());
        }

        while let Some(BodySignal::RequestData) = self.signal_receiver.next().await {
            if exchange.expect_continue {
                debug!("client is waiting on its expectation, sending 100 continue");
                if let Err(e) = writer.send_continue().await {
                    error!("failed to send 100 continue, {}", e);
                    return Err(ParseError::UnexpectedEof);
                }
                exchange.expect_continue = false;
            }

            match reader.next_content().await {
                Ok(Some(bytes)) => {
                    if self.data_sender.send(Ok(BodyFrameItem::Chunk(bytes))).await.is_err() {
                        // handler lost interest mid-read
                        return Ok(());
                    }
                }
                Ok(None) => {
                    self.eof = true;
                    let _ = self.data_sender.send(Ok(BodyFrameItem::End)).await;
                    return Ok(());
                }
                Err(e) => {
                    error!("failed to read request body, {}", e);
                    let _ = self.data_sender.send(Err(e)).await;
                    return Err(ParseError::invalid_body("request body stream failed"));
                }
            }
        }

        Ok(())
    }
}

/// The handler-side half, a [`Body`] over preloaded chunks plus the channel.
pub(crate) struct BodyReceiver {
    preloaded: VecDeque<Bytes>,
    channel: Option<ReceiverChannel>,
    size: BodySize,
    ended: bool,
}

struct ReceiverChannel {
    signal_sender: mpsc::Sender<BodySignal>,
    data_receiver: mpsc::Receiver<Result<BodyFrameItem, ParseError>>,
    in_flight: bool,
}

impl BodyReceiver {
    /// A body whose bytes were all decoded before the handler ran.
    pub(crate) fn preloaded(preloaded: VecDeque<Bytes>, size: BodySize) -> Self {
        Self { preloaded, channel: None, size, ended: false }
    }
}

impl Body for BodyReceiver {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(bytes) = this.preloaded.pop_front() {
            return Poll::Ready(Some(Ok(Frame::data(bytes))));
        }

        let channel = match &mut this.channel {
            Some(channel) if !this.ended => channel,
            _ => return Poll::Ready(None),
        };

        if !channel.in_flight {
            match channel.signal_sender.poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if channel.signal_sender.start_send(BodySignal::RequestData).is_err() {
                        return Poll::Ready(Some(Err(ParseError::invalid_body(
                            "failed to signal for more body data",
                        ))));
                    }
                    channel.in_flight = true;
                }
                Poll::Ready(Err(_)) => {
                    return Poll::Ready(Some(Err(ParseError::invalid_body("failed to signal for more body data"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match channel.data_receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(BodyFrameItem::Chunk(bytes)))) => {
                channel.in_flight = false;
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Ok(BodyFrameItem::End))) => {
                this.ended = true;
                this.channel = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.ended = true;
                this.channel = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                // connection went away without delivering the end of the body
                this.ended = true;
                this.channel = None;
                Poll::Ready(Some(Err(ParseError::UnexpectedEof)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.preloaded.is_empty() && (self.ended || self.channel.is_none())
    }

    fn size_hint(&self) -> SizeHint {
        self.size.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;
    use futures::FutureExt;

    #[test]
    fn preloaded_chunks_drain_without_signaling() {
        let mut preloaded = VecDeque::new();
        preloaded.push_back(Bytes::from_static(b"hel"));
        preloaded.push_back(Bytes::from_static(b"lo"));
        let mut receiver = BodyReceiver::preloaded(preloaded, BodySize::Length(5));

        let mut cx = Context::from_waker(noop_waker_ref());

        match Pin::new(&mut receiver).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"hel")),
            other => panic!("unexpected poll result: {:?}", other.map(|o| o.map(|r| r.map(|_| ())))),
        }
        match Pin::new(&mut receiver).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"lo")),
            other => panic!("unexpected poll result: {:?}", other.map(|o| o.map(|r| r.map(|_| ())))),
        }
        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(receiver.is_end_stream());
    }

    #[tokio::test]
    async fn receiver_signals_once_per_chunk() {
        let (mut receiver, sender_parts) = body_channel(VecDeque::new(), BodySize::Chunked);
        let BodySender { mut signal_receiver, mut data_sender, .. } = sender_parts;

        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(matches!(signal_receiver.next().await, Some(BodySignal::RequestData)));

        // no second demand until the first is answered
        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(signal_receiver.next().now_or_never().is_none());

        data_sender.try_send(Ok(BodyFrameItem::Chunk(Bytes::from_static(b"hello")))).expect("send chunk");

        match Pin::new(&mut receiver).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => {
                assert_eq!(frame.into_data().expect("data frame"), Bytes::from_static(b"hello"));
            }
            other => panic!("unexpected poll result: {:?}", other.map(|o| o.map(|r| r.map(|_| ())))),
        }

        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(matches!(signal_receiver.next().await, Some(BodySignal::RequestData)));

        data_sender.try_send(Ok(BodyFrameItem::End)).expect("send end");
        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(receiver.is_end_stream());
    }
}
