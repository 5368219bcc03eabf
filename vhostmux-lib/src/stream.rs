use bytes::Bytes;
use std::{
  io,
  net::SocketAddr,
  pin::Pin,
  task::{Context, Poll},
};
use tokio::{
  io::{AsyncRead, AsyncWrite, ReadBuf},
  net::TcpStream,
};

/* ---------------------------------------------------------- */
/// A classified client connection.
///
/// Owns the underlying `TcpStream` together with the handshake bytes the
/// muxer consumed during classification. Reads drain the retained bytes
/// before touching the socket, so the consumer observes the original byte
/// stream from offset 0 and the TLS handshake (or HTTP request) can be
/// replayed to a local TLS acceptor or spliced verbatim to a backend.
#[derive(Debug)]
pub struct MuxedStream {
  /// Classified bytes not yet handed to the consumer
  peeked: Bytes,
  /// Lowercased hostname extracted from SNI or the Host header
  hostname: String,
  inner: TcpStream,
}

impl MuxedStream {
  pub(crate) fn new(inner: TcpStream, peeked: Bytes, hostname: String) -> Self {
    Self { peeked, hostname, inner }
  }

  /// Hostname this connection was classified under
  pub fn hostname(&self) -> &str {
    &self.hostname
  }

  pub fn peer_addr(&self) -> io::Result<SocketAddr> {
    self.inner.peer_addr()
  }
}

impl AsyncRead for MuxedStream {
  fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
    let this = self.get_mut();
    if !this.peeked.is_empty() {
      let n = this.peeked.len().min(buf.remaining());
      buf.put_slice(&this.peeked.split_to(n));
      return Poll::Ready(Ok(()));
    }
    Pin::new(&mut this.inner).poll_read(cx, buf)
  }
}

impl AsyncWrite for MuxedStream {
  fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.get_mut().inner).poll_flush(cx)
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
  }

  fn poll_write_vectored(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    bufs: &[io::IoSlice<'_>],
  ) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
  }

  fn is_write_vectored(&self) -> bool {
    self.inner.is_write_vectored()
  }
}

/* ---------------------------------------------------------- */
#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  #[tokio::test]
  async fn reads_replay_the_peeked_bytes_first() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
      let mut stream = TcpStream::connect(addr).await.unwrap();
      stream.write_all(b" tail").await.unwrap();
    });

    let (accepted, _) = listener.accept().await.unwrap();
    let mut muxed = MuxedStream::new(
      accepted,
      Bytes::from_static(b"peeked head"),
      "test.example.com".to_string(),
    );
    assert_eq!(muxed.hostname(), "test.example.com");

    // A deliberately small first read must return only peeked bytes
    let mut small = [0u8; 6];
    muxed.read_exact(&mut small).await.unwrap();
    assert_eq!(&small, b"peeked");

    let mut rest = Vec::new();
    muxed.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, b" head tail");

    client.await.unwrap();
  }
}
