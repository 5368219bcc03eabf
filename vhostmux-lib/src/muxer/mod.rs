use crate::{
  constants::{FRONTEND_QUEUE_CAPACITY, MUX_ERROR_CHANNEL_CAPACITY, MUX_HANDSHAKE_TIMEOUT},
  error::{MuxError, ProxyError},
  stream::MuxedStream,
  trace::*,
};
use bytes::BytesMut;
use std::{
  collections::HashMap,
  net::SocketAddr,
  sync::{Arc, Mutex},
};
use tokio::{
  net::{TcpListener, TcpStream},
  sync::mpsc,
  time::timeout,
};
use tokio_util::sync::CancellationToken;

mod http;
mod tls;

/* ---------------------------------------------------------- */
/// How a bind classifies incoming connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MuxProtocol {
  /// TLS ClientHello, hostname from the SNI extension
  Tls,
  /// Plaintext HTTP, hostname from the Host header
  Http,
}

impl std::fmt::Display for MuxProtocol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Tls => write!(f, "TLS-SNI"),
      Self::Http => write!(f, "HTTP-Host"),
    }
  }
}

type Registry = Arc<Mutex<HashMap<String, mpsc::Sender<MuxedStream>>>>;

/// One drained classification failure; the connection is present unless the
/// muxer itself closed
pub(crate) type MuxErrorEntry = (Option<MuxedStream>, MuxError);

/* ---------------------------------------------------------- */
/// Per-bind hostname demultiplexer.
///
/// Accepts connections from the bound listener, classifies each one by
/// virtual-host name within [`MUX_HANDSHAKE_TIMEOUT`], and enqueues it on the
/// matching registered frontend's queue. Classification failures surface on
/// the error channel returned by [`Muxer::start`]; a single malformed client
/// never terminates the muxer.
pub(crate) struct Muxer {
  registry: Registry,
  cancel: CancellationToken,
}

/// Receiving side of the muxer's classification-error channel
pub(crate) struct MuxErrorStream {
  rx: mpsc::Receiver<MuxErrorEntry>,
}

impl MuxErrorStream {
  /// Next classification failure. Yields `(None, MuxError::Closed)` once the
  /// muxer has shut down; the caller must then exit its drain loop.
  pub(crate) async fn next(&mut self) -> MuxErrorEntry {
    match self.rx.recv().await {
      Some(entry) => entry,
      None => (None, MuxError::Closed),
    }
  }
}

/// Accept side of one frontend's queue of classified connections
pub(crate) struct FrontendListener {
  rx: mpsc::Receiver<MuxedStream>,
}

impl FrontendListener {
  /// Next classified connection; `None` once the frontend was unregistered or
  /// the muxer closed. Dropping the listener closes any queued connections.
  pub(crate) async fn accept(&mut self) -> Option<MuxedStream> {
    self.rx.recv().await
  }
}

/* ---------------------------------------------------------- */
impl Muxer {
  /// Start accepting and classifying on `listener`
  pub(crate) fn start(listener: TcpListener, protocol: MuxProtocol, cancel: CancellationToken) -> (Self, MuxErrorStream) {
    let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
    let (error_tx, error_rx) = mpsc::channel(MUX_ERROR_CHANNEL_CAPACITY);

    tokio::spawn(accept_loop(listener, protocol, registry.clone(), error_tx, cancel.clone()));

    (Self { registry, cancel }, MuxErrorStream { rx: error_rx })
  }

  /// Reserve `name`: future connections whose classified hostname equals it
  /// are enqueued on the returned listener. Matching is case-insensitive.
  /// Registering a name already present fails.
  pub(crate) fn register(&self, name: &str) -> Result<FrontendListener, ProxyError> {
    let key = name.to_ascii_lowercase();
    let mut registry = self.registry.lock().unwrap();
    if registry.contains_key(&key) {
      return Err(ProxyError::FrontendExists { name: name.to_string() });
    }
    let (tx, rx) = mpsc::channel(FRONTEND_QUEUE_CAPACITY);
    registry.insert(key, tx);
    Ok(FrontendListener { rx })
  }

  /// Stop routing to `name`
  pub(crate) fn unregister(&self, name: &str) {
    self.registry.lock().unwrap().remove(&name.to_ascii_lowercase());
  }

  /// Shut down: stop the accept loop and close every per-frontend queue.
  /// The error channel closes once in-flight classifications have finished.
  pub(crate) fn close(&self) {
    self.cancel.cancel();
    self.registry.lock().unwrap().clear();
  }
}

/* ---------------------------------------------------------- */
async fn accept_loop(
  listener: TcpListener,
  protocol: MuxProtocol,
  registry: Registry,
  error_tx: mpsc::Sender<MuxErrorEntry>,
  cancel: CancellationToken,
) {
  loop {
    let (stream, src_addr) = tokio::select! {
      _ = cancel.cancelled() => break,
      res = listener.accept() => match res {
        Ok(accepted) => accepted,
        Err(e) => {
          // Transient accept failures (EMFILE and friends) must not end the bind
          error!("Accept error on {protocol} muxer: {e}");
          continue;
        }
      },
    };
    debug!("Accepted connection from {src_addr}");
    tokio::spawn(classify(
      stream,
      src_addr,
      protocol,
      registry.clone(),
      error_tx.clone(),
      cancel.clone(),
    ));
  }
  debug!("{protocol} muxer accept loop stopped");
}

/// Classify one accepted connection and hand it to its frontend's queue
async fn classify(
  mut stream: TcpStream,
  src_addr: SocketAddr,
  protocol: MuxProtocol,
  registry: Registry,
  error_tx: mpsc::Sender<MuxErrorEntry>,
  cancel: CancellationToken,
) {
  let mut buf = BytesMut::new();
  let sniffed = tokio::select! {
    _ = cancel.cancelled() => return,
    res = timeout(MUX_HANDSHAKE_TIMEOUT, async {
      match protocol {
        MuxProtocol::Tls => tls::read_client_hello(&mut stream, &mut buf).await,
        MuxProtocol::Http => http::read_request_host(&mut stream, &mut buf).await,
      }
    }) => res,
  };

  let hostname = match sniffed {
    Err(_) => {
      let reason = format!("hostname not classified within {MUX_HANDSHAKE_TIMEOUT:?}");
      let conn = MuxedStream::new(stream, buf.freeze(), String::new());
      let _ = error_tx.send((Some(conn), MuxError::BadRequest { src_addr, reason })).await;
      return;
    }
    Ok(Err(e)) => {
      let conn = MuxedStream::new(stream, buf.freeze(), String::new());
      let _ = error_tx
        .send((Some(conn), MuxError::BadRequest { src_addr, reason: e.to_string() }))
        .await;
      return;
    }
    Ok(Ok(hostname)) => hostname,
  };
  debug!("Classified connection from {src_addr} for host '{hostname}'");

  let sender = registry.lock().unwrap().get(&hostname).cloned();
  let conn = MuxedStream::new(stream, buf.freeze(), hostname.clone());
  let Some(sender) = sender else {
    let _ = error_tx.send((Some(conn), MuxError::NotFound { src_addr, hostname })).await;
    return;
  };

  if let Err(returned) = sender.send(conn).await {
    // frontend was removed between lookup and enqueue
    let _ = error_tx
      .send((Some(returned.0), MuxError::NotFound { src_addr, hostname }))
      .await;
  }
}

/* ---------------------------------------------------------- */
