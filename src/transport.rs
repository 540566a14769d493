//! Plain / TLS / auto-detected transport for accepted sockets.
//!
//! Mirrors the teacher crate's direct `TcpStream` I/O, but behind one
//! [`Connection`] enum so [`HttpConnection`](crate::server::connection::HttpConnection)
//! never has to know whether a socket is wrapped in TLS. No inheritance
//! is needed for this - a tagged enum over the two concrete streams
//! implements `AsyncRead`/`AsyncWrite` once and the rest of the pipeline
//! is untouched.

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::{server::TlsStream, TlsAcceptor};
use tracing::warn;

/// How a [`Server`](crate::Server) decides whether an accepted socket
/// speaks plain HTTP or TLS.
///
/// # Examples
/// ```no_run
/// # warden_web::impt_default_handler!{ MyStruct }
/// use warden_web::TlsMode;
///
/// // Plain TCP only - the default.
/// let _mode = TlsMode::Plain;
/// ```
#[derive(Clone)]
pub enum TlsMode {
    /// Every connection is plain TCP.
    Plain,
    /// Every connection performs a TLS handshake before HTTP begins.
    Tls(Arc<TlsAcceptor>),
    /// Peeks the first byte of the accepted socket; `0x16` (the TLS
    /// `ContentType::Handshake` tag) triggers a handshake, anything
    /// else is served as plain HTTP. Detection happens exactly once,
    /// on the first byte of the connection.
    Detect(Arc<TlsAcceptor>),
}

impl Default for TlsMode {
    fn default() -> Self {
        TlsMode::Plain
    }
}

/// The TLS `ContentType::Handshake` byte that opens every ClientHello.
const TLS_HANDSHAKE_BYTE: u8 = 0x16;

/// A transport-agnostic connection: either a raw TCP byte stream or one
/// wrapped in a server-side TLS session. Both read/write through the
/// same `AsyncRead`/`AsyncWrite` surface, so the request pipeline above
/// never branches on which one it holds.
pub(crate) enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    /// Performs whatever `mode` requires on a freshly accepted socket -
    /// nothing, an unconditional handshake, or a first-byte peek
    /// followed by a conditional handshake. Returns `None` on detect or
    /// handshake failure; per spec §4.1 these drop the connection
    /// silently beyond a log line, there is no response to send because
    /// no HTTP has been read yet.
    pub(crate) async fn begin(mode: &TlsMode, stream: TcpStream) -> Option<Self> {
        match mode {
            TlsMode::Plain => Some(Connection::Plain(stream)),
            TlsMode::Tls(acceptor) => Self::handshake(acceptor, stream).await,
            TlsMode::Detect(acceptor) => {
                let mut probe = [0u8; 1];
                match stream.peek(&mut probe).await {
                    Ok(n) if n > 0 && probe[0] == TLS_HANDSHAKE_BYTE => {
                        Self::handshake(acceptor, stream).await
                    }
                    Ok(_) => Some(Connection::Plain(stream)),
                    Err(error) => {
                        warn!(%error, "failed to peek accepted socket for TLS detection");
                        None
                    }
                }
            }
        }
    }

    async fn handshake(acceptor: &TlsAcceptor, stream: TcpStream) -> Option<Self> {
        match acceptor.accept(stream).await {
            Ok(tls) => Some(Connection::Tls(Box::new(tls))),
            Err(error) => {
                warn!(%error, "TLS handshake failed");
                None
            }
        }
    }

    /// Half-closes the underlying transport: `TcpStream::shutdown` for
    /// plain connections, the rustls-backed async `close_notify` for
    /// TLS. Per spec §4.1/§9, all shutdown errors are swallowed - the
    /// only observable effect is that the connection stops accepting
    /// further work.
    pub(crate) async fn shutdown(&mut self) {
        let _ = match self {
            Connection::Plain(stream) => stream.shutdown().await,
            Connection::Tls(stream) => stream.shutdown().await,
        };
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tls_mode_is_plain() {
        assert!(matches!(TlsMode::default(), TlsMode::Plain));
    }
}
