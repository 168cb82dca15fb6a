//! The `101 Switching Protocols` handoff.
//!
//! When a request announces an upgrade intent, the driver arms a one-shot
//! channel and plants its receiving end, an [`OnUpgrade`] future, in the
//! request extensions. A handler that agrees to switch grabs it with
//! [`on`], responds `101`, and awaits the future (usually from a spawned
//! task). Once the `101` is on the wire the driver fulfills the channel
//! with the [`Upgraded`] transport, whose reads first drain whatever bytes
//! the old protocol had buffered past the request.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;

/// A transport whose HTTP connection has been replaced by another protocol.
pub struct Upgraded {
    io: Box<dyn Io + Send>,
    read_buf: Bytes,
}

/// Object-safe bound for the boxed transport.
pub trait Io: AsyncRead + AsyncWrite + Unpin {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin {}

impl Upgraded {
    pub(crate) fn new<T>(io: T, read_buf: Bytes) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self { io: Box::new(io), read_buf }
    }

    /// The boxed transport and the bytes that were read past the request.
    pub fn into_parts(self) -> (Box<dyn Io + Send>, Bytes) {
        (self.io, self.read_buf)
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if !self.read_buf.is_empty() {
            let len = self.read_buf.len().min(buf.remaining());
            buf.put_slice(&self.read_buf[..len]);
            self.read_buf.advance(len);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgraded").field("buffered", &self.read_buf.len()).finish()
    }
}

#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The request did not carry an upgrade, or it was already taken.
    #[error("no protocol upgrade was available on this request")]
    NoUpgrade,

    /// The connection finished without switching protocols, for example
    /// because the response was not a `101`.
    #[error("the connection closed without an upgrade")]
    ConnectionDropped,
}

type UpgradeResult = Result<Upgraded, UpgradeError>;

/// Resolves once the driver hands the transport over.
///
/// Clonable so it can sit in request extensions; only one clone can win the
/// transport.
#[derive(Clone)]
pub struct OnUpgrade {
    rx: Option<Arc<Mutex<oneshot::Receiver<UpgradeResult>>>>,
}

impl OnUpgrade {
    fn none() -> Self {
        Self { rx: None }
    }
}

impl Future for OnUpgrade {
    type Output = UpgradeResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx {
            Some(ref rx) => {
                let mut rx = match rx.lock() {
                    Ok(rx) => rx,
                    Err(_) => return Poll::Ready(Err(UpgradeError::ConnectionDropped)),
                };
                Pin::new(&mut *rx).poll(cx).map(|result| match result {
                    Ok(upgraded) => upgraded,
                    Err(_) => Err(UpgradeError::ConnectionDropped),
                })
            }
            None => Poll::Ready(Err(UpgradeError::NoUpgrade)),
        }
    }
}

impl fmt::Debug for OnUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnUpgrade").finish()
    }
}

/// Driver-side end of the upgrade channel.
pub(crate) struct Pending {
    tx: oneshot::Sender<UpgradeResult>,
}

impl Pending {
    pub(crate) fn fulfill(self, upgraded: Upgraded) {
        let _ = self.tx.send(Ok(upgraded));
    }
}

pub(crate) fn pending() -> (Pending, OnUpgrade) {
    let (tx, rx) = oneshot::channel();
    (Pending { tx }, OnUpgrade { rx: Some(Arc::new(Mutex::new(rx))) })
}

/// Takes the upgrade future out of a request.
///
/// Returns a future that fails with [`UpgradeError::NoUpgrade`] when the
/// request carried no upgrade intent.
pub fn on<B>(req: &mut http::Request<B>) -> OnUpgrade {
    req.extensions_mut().remove::<OnUpgrade>().unwrap_or_else(OnUpgrade::none)
}
