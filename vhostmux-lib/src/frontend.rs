use crate::{
  backend::BackendStrategy,
  config::Backend,
  muxer::FrontendListener,
  stream::MuxedStream,
  trace::*,
};
use std::time::Duration;
use tokio::{
  io::{copy_bidirectional, AsyncRead, AsyncWrite},
  net::TcpStream,
  time::timeout,
};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/* ---------------------------------------------------------- */
/// Services one virtual host: drains its queue of classified connections and
/// proxies each to a backend picked by the strategy, optionally terminating
/// TLS first.
pub(crate) struct FrontendWorker {
  name: String,
  listener: FrontendListener,
  /// Present when the frontend configures a certificate and key
  tls_acceptor: Option<TlsAcceptor>,
  strategy: Box<dyn BackendStrategy + Send>,
  cancel: CancellationToken,
}

impl FrontendWorker {
  pub(crate) fn new(
    name: String,
    listener: FrontendListener,
    tls_acceptor: Option<TlsAcceptor>,
    strategy: Box<dyn BackendStrategy + Send>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      name,
      listener,
      tls_acceptor,
      strategy,
      cancel,
    }
  }

  pub(crate) async fn run(mut self) {
    info!("Handling connections for frontend '{}'", self.name);
    loop {
      let conn = tokio::select! {
        _ = self.cancel.cancelled() => break,
        accepted = self.listener.accept() => match accepted {
          Some(conn) => conn,
          // queue closed: the frontend was removed or the muxer shut down
          None => break,
        },
      };
      debug!(
        "Frontend '{}' accepted connection from {:?}",
        self.name,
        conn.peer_addr().ok()
      );

      // Selection stays in the accept loop, so the strategy sees one
      // strictly sequential call per connection
      let backend = self.strategy.next_backend().clone();
      let acceptor = self.tls_acceptor.clone();
      let name = self.name.clone();
      tokio::spawn(async move {
        serve_connection(name, conn, backend, acceptor).await;
      });
    }
    debug!("Frontend worker '{}' stopped", self.name);
  }
}

/* ---------------------------------------------------------- */
async fn serve_connection(name: String, conn: MuxedStream, backend: Backend, acceptor: Option<TlsAcceptor>) {
  match acceptor {
    Some(acceptor) => {
      // Terminate TLS locally; the retained ClientHello bytes replay into the handshake
      let tls_stream = match acceptor.accept(conn).await {
        Ok(stream) => stream,
        Err(e) => {
          warn!("Frontend '{name}': TLS handshake failed: {e}");
          return;
        }
      };
      proxy_to_backend(name, tls_stream, backend).await;
    }
    None => proxy_to_backend(name, conn, backend).await,
  }
}

/// Dial the chosen backend and splice until both directions finish.
/// Dial failure closes the client connection; there is no retry against
/// another backend.
async fn proxy_to_backend<S>(name: String, mut client: S, backend: Backend)
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let connect_timeout = Duration::from_millis(backend.connect_timeout);
  let mut upstream = match timeout(connect_timeout, TcpStream::connect(backend.addr.as_str())).await {
    Ok(Ok(stream)) => stream,
    Ok(Err(e)) => {
      error!("Frontend '{name}': failed to dial backend {}: {e}", backend.addr);
      return;
    }
    Err(_) => {
      error!(
        "Frontend '{name}': dialing backend {} timed out after {connect_timeout:?}",
        backend.addr
      );
      return;
    }
  };
  debug!("Frontend '{name}': connected to backend {}", backend.addr);

  match copy_bidirectional(&mut client, &mut upstream).await {
    Ok((to_backend, from_backend)) => {
      debug!("Frontend '{name}': connection closed, {to_backend} bytes out, {from_backend} bytes in");
    }
    Err(e) => {
      // Resets at teardown land here; the pair is dropped either way
      debug!("Frontend '{name}': splice ended with error: {e}");
    }
  }
}
