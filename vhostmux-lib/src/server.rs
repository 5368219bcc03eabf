use crate::{
  backend::RoundRobin,
  config::{Binding, Frontend},
  constants::{BAD_REQUEST_PAYLOAD, NOT_FOUND_PAYLOAD, TCP_BACKLOG},
  error::{MuxError, ProxyError},
  frontend::FrontendWorker,
  muxer::{MuxErrorStream, MuxProtocol, Muxer},
  stream::MuxedStream,
  tls::{pem_file_loader, TlsConfigLoader},
  trace::*,
  watcher::FrontendUpdater,
};
use std::{
  collections::HashMap,
  net::SocketAddr,
  sync::{Arc, Mutex},
};
use tokio::{
  io::AsyncWriteExt,
  net::{TcpListener, TcpSocket},
};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/* ---------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
  New,
  Initialized,
  Running,
  Stopping,
  Stopped,
}

/// A live worker entry in the frontend registry. The token stops the worker;
/// dropping its queue closes any unaccepted connections.
struct FrontendHandle {
  cancel: CancellationToken,
}

/// Per-bind coordinator: owns the listening socket, the muxer and the
/// frontend registry, serves registry mutations under one mutex, and drives
/// the muxer's error-drain loop.
pub struct Server {
  name: String,
  binding: Binding,
  tls_loader: TlsConfigLoader,
  state: Mutex<ServerState>,
  frontends: Mutex<HashMap<String, FrontendHandle>>,
  mux: Mutex<Option<Muxer>>,
  ready: CancellationToken,
  stop: CancellationToken,
}

impl Server {
  /// Server with the PEM-file certificate loader
  pub fn new(name: impl Into<String>, binding: Binding) -> Self {
    Self::with_tls_loader(name, binding, pem_file_loader())
  }

  /// Server with an injected certificate loader
  pub fn with_tls_loader(name: impl Into<String>, binding: Binding, tls_loader: TlsConfigLoader) -> Self {
    Self {
      name: name.into(),
      binding,
      tls_loader,
      state: Mutex::new(ServerState::New),
      frontends: Mutex::new(HashMap::new()),
      mux: Mutex::new(None),
      ready: CancellationToken::new(),
      stop: CancellationToken::new(),
    }
  }

  /// Establish the readiness signal; must be called before [`Server::run`]
  pub fn init(&self) -> Result<(), ProxyError> {
    let mut state = self.state.lock().unwrap();
    match *state {
      ServerState::New => {
        *state = ServerState::Initialized;
        Ok(())
      }
      ServerState::Initialized => Ok(()),
      _ => Err(ProxyError::AlreadyRunning {
        server: self.name.clone(),
      }),
    }
  }

  /// Resolves once the listener is bound and every startup frontend is routed
  pub fn ready(&self) -> WaitForCancellationFutureOwned {
    self.ready.clone().cancelled_owned()
  }

  /// Bind, serve and block until [`Server::stop`]. On return the muxer is
  /// closed, every frontend worker is stopped and every per-frontend queue is
  /// closed.
  pub async fn run(&self) -> Result<(), ProxyError> {
    {
      let mut state = self.state.lock().unwrap();
      match *state {
        ServerState::Initialized => *state = ServerState::Running,
        ServerState::New => {
          return Err(ProxyError::NotInitialized {
            server: self.name.clone(),
          })
        }
        _ => {
          return Err(ProxyError::AlreadyRunning {
            server: self.name.clone(),
          })
        }
      }
    }

    let listener = match self.bind_listener() {
      Ok(listener) => listener,
      Err(e) => {
        *self.state.lock().unwrap() = ServerState::Stopped;
        return Err(e);
      }
    };
    info!("{}: serving connections on {}", self.name, self.binding.bind_addr);

    let protocol = if self.binding.secure {
      MuxProtocol::Tls
    } else {
      MuxProtocol::Http
    };
    let (muxer, errors) = Muxer::start(listener, protocol, self.stop.child_token());
    *self.mux.lock().unwrap() = Some(muxer);

    // Startup frontends: failures are logged and skipped, never fatal
    for front in self.binding.frontends.values() {
      if let Err(e) = self.add_frontend(front.clone()) {
        warn!("{}: failed to add frontend '{}': {e}", self.name, front.name);
        continue;
      }
      debug!("{}: added frontend '{}'", self.name, front.name);
    }

    let drain = tokio::spawn(drain_errors(self.name.clone(), errors));

    self.ready.cancel();

    self.stop.cancelled().await;
    *self.state.lock().unwrap() = ServerState::Stopping;

    if let Some(muxer) = self.mux.lock().unwrap().take() {
      muxer.close();
    }
    self.remove_frontends();
    // Stopped only once the drain loop has observed Closed
    let _ = drain.await;
    *self.state.lock().unwrap() = ServerState::Stopped;
    debug!("{}: stopped", self.name);
    Ok(())
  }

  /// Idempotent; safe from any task
  pub fn stop(&self) {
    self.stop.cancel();
  }

  /// Bind with `SO_REUSEADDR` and `SO_REUSEPORT` set, so a restarted server
  /// can take the address back immediately
  fn bind_listener(&self) -> Result<TcpListener, ProxyError> {
    let addr: SocketAddr = self.binding.bind_addr.parse().map_err(|source| ProxyError::InvalidBindAddr {
      addr: self.binding.bind_addr.clone(),
      source,
    })?;

    let bind = |addr: SocketAddr| -> std::io::Result<TcpListener> {
      let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
      };
      socket.set_reuseaddr(true)?;
      #[cfg(unix)]
      socket.set_reuseport(true)?;
      socket.bind(addr)?;
      socket.listen(TCP_BACKLOG)
    };
    bind(addr).map_err(|source| ProxyError::BindFailed { addr, source })
  }

  /* ---------------------------------------------------------- */
  /// Add a frontend; fails if the name is already present
  pub fn add_frontend(&self, front: Frontend) -> Result<(), ProxyError> {
    let mut frontends = self.frontends.lock().unwrap();
    self.add_frontend_locked(&mut frontends, front)
  }

  /// Remove-then-add as one critical section, so the muxer never observes the
  /// name doubly-registered
  pub fn replace_frontend(&self, front: Frontend) -> Result<(), ProxyError> {
    let mut frontends = self.frontends.lock().unwrap();
    self.remove_frontend_locked(&mut frontends, &front.name);
    self.add_frontend_locked(&mut frontends, front)
  }

  /// Remove a frontend, stopping its worker and closing its queue
  pub fn remove_frontend(&self, name: &str) {
    let mut frontends = self.frontends.lock().unwrap();
    if !self.remove_frontend_locked(&mut frontends, name) {
      warn!("{}: frontend '{}' doesn't exist", self.name, name);
    }
  }

  /// Drain the whole registry in one critical section; used on shutdown
  pub fn remove_frontends(&self) {
    let mut frontends = self.frontends.lock().unwrap();
    let names: Vec<String> = frontends.keys().cloned().collect();
    for name in names {
      self.remove_frontend_locked(&mut frontends, &name);
    }
  }

  fn add_frontend_locked(&self, frontends: &mut HashMap<String, FrontendHandle>, front: Frontend) -> Result<(), ProxyError> {
    if frontends.contains_key(&front.name) {
      return Err(ProxyError::FrontendExists {
        name: front.name.clone(),
      });
    }

    // Certificate load stays inside the critical section: a bounded disk read
    let tls_acceptor = if front.terminates_tls() {
      let config = (self.tls_loader)(&front.tls_crt, &front.tls_key).map_err(|e| ProxyError::TlsConfigLoad {
        name: front.name.clone(),
        reason: e.to_string(),
      })?;
      Some(TlsAcceptor::from(Arc::new(config)))
    } else {
      None
    };

    let listener = {
      let mux = self.mux.lock().unwrap();
      let Some(mux) = mux.as_ref() else {
        return Err(ProxyError::MuxerNotRunning);
      };
      mux.register(&front.name)?
    };

    let cancel = CancellationToken::new();
    let worker = FrontendWorker::new(
      front.name.clone(),
      listener,
      tls_acceptor,
      Box::new(RoundRobin::new(front.backends)),
      cancel.clone(),
    );
    frontends.insert(front.name, FrontendHandle { cancel });
    tokio::spawn(worker.run());
    Ok(())
  }

  fn remove_frontend_locked(&self, frontends: &mut HashMap<String, FrontendHandle>, name: &str) -> bool {
    let Some(handle) = frontends.remove(name) else {
      return false;
    };
    if let Some(mux) = self.mux.lock().unwrap().as_ref() {
      mux.unregister(name);
    }
    handle.cancel.cancel();
    true
  }
}

impl FrontendUpdater for Server {
  fn replace_frontend(&self, frontend: Frontend) -> Result<(), ProxyError> {
    Server::replace_frontend(self, frontend)
  }

  fn remove_frontend(&self, name: &str) {
    Server::remove_frontend(self, name)
  }
}

/* ---------------------------------------------------------- */
/// Drain classification failures until the muxer closes
async fn drain_errors(name: String, mut errors: MuxErrorStream) {
  loop {
    let (conn, err) = errors.next().await;
    match err {
      MuxError::BadRequest { .. } => {
        error!("{name}: {err}");
        respond_and_close(conn, BAD_REQUEST_PAYLOAD).await;
      }
      MuxError::NotFound { .. } => {
        error!("{name}: {err}");
        respond_and_close(conn, NOT_FOUND_PAYLOAD).await;
      }
      MuxError::Closed => {
        debug!("{name}: muxer closed, stopping error drain");
        break;
      }
    }
  }
}

async fn respond_and_close(conn: Option<MuxedStream>, payload: &[u8]) {
  if let Some(mut conn) = conn {
    // best effort, the client may already be gone
    let _ = conn.write_all(payload).await;
    let _ = conn.shutdown().await;
  }
}

/* ---------------------------------------------------------- */
#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Backend;
  use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
  use std::{sync::Once, time::Duration};
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::{TcpListener, TcpStream};
  use tokio::sync::mpsc;
  use tokio::time::timeout;
  use tokio_rustls::{TlsAcceptor, TlsConnector};

  static INIT_CRYPTO: Once = Once::new();

  fn init_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
      rustls::crypto::ring::default_provider().install_default().ok();
    });
  }

  /// Self-signed certificate shared by test backends, the in-memory
  /// certificate loader, and clients (which trust it as a root)
  struct TestCert {
    server_config: rustls::ServerConfig,
    roots: rustls::RootCertStore,
  }

  fn test_cert() -> TestCert {
    init_crypto_provider();
    let cert = rcgen::generate_simple_self_signed(vec![
      "test.example.com".to_string(),
      "test1.example.com".to_string(),
      "test2.example.com".to_string(),
    ])
    .unwrap();
    let cert_der = CertificateDer::from(cert.cert.der().to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()));

    let mut server_config = rustls::ServerConfig::builder()
      .with_no_client_auth()
      .with_single_cert(vec![cert_der.clone()], key)
      .unwrap();
    // no post-handshake tickets: clients close right after writing, and
    // unread ticket bytes would turn that close into a reset
    server_config.send_tls13_tickets = 0;

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert_der).unwrap();

    TestCert { server_config, roots }
  }

  /// Loader that ignores the paths and returns the prepared config
  fn memory_loader(config: rustls::ServerConfig) -> TlsConfigLoader {
    Arc::new(move |_crt_path, _key_path| Ok(config.clone()))
  }

  /// TLS listener that records the plaintext each accepted connection delivers
  async fn tls_capture_backend(config: rustls::ServerConfig) -> (String, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      loop {
        let Ok((stream, _)) = listener.accept().await else { break };
        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
          let Ok(mut tls) = acceptor.accept(stream).await else { return };
          let mut got = Vec::new();
          if tls.read_to_end(&mut got).await.is_ok() {
            let _ = tx.send(got);
          }
        });
      }
    });

    (addr, rx)
  }

  /// Plain TCP listener that records whatever bytes each connection delivers
  async fn tcp_capture_backend() -> (String, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      loop {
        let Ok((mut stream, _)) = listener.accept().await else { break };
        let tx = tx.clone();
        tokio::spawn(async move {
          let mut got = Vec::new();
          if stream.read_to_end(&mut got).await.is_ok() {
            let _ = tx.send(got);
          }
        });
      }
    });

    (addr, rx)
  }

  async fn tls_client(
    addr: &str,
    server_name: &str,
    roots: rustls::RootCertStore,
  ) -> std::io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let config = rustls::ClientConfig::builder()
      .with_root_certificates(roots)
      .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let stream = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from(server_name.to_string()).unwrap();
    connector.connect(server_name, stream).await
  }

  fn frontend(name: &str, bound_addr: &str, backends: &[&str]) -> Frontend {
    Frontend {
      name: name.to_string(),
      bound_addr: bound_addr.to_string(),
      backends: backends
        .iter()
        .map(|addr| Backend {
          addr: addr.to_string(),
          connect_timeout: 10_000,
        })
        .collect(),
      ..Default::default()
    }
  }

  fn binding(bind_addr: &str, secure: bool, frontends: Vec<Frontend>) -> Binding {
    Binding {
      bind_addr: bind_addr.to_string(),
      secure,
      watch: false,
      frontends: frontends.into_iter().map(|f| (f.name.clone(), f)).collect(),
    }
  }

  async fn start_server(
    binding: Binding,
    loader: TlsConfigLoader,
  ) -> (Arc<Server>, tokio::task::JoinHandle<Result<(), ProxyError>>) {
    let server = Arc::new(Server::with_tls_loader(binding.bind_addr.clone(), binding, loader));
    server.init().unwrap();
    let handle = tokio::spawn({
      let server = server.clone();
      async move { server.run().await }
    });
    server.ready().await;
    (server, handle)
  }

  async fn expect_payload(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, expected: &[u8]) {
    let got = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, expected);
  }

  /* ---------------------------------------------------------- */
  #[tokio::test]
  async fn simple_routing_after_replace() {
    const BIND: &str = "127.0.0.1:55111";
    let cert = test_cert();
    let (backend_addr, mut backend_rx) = tls_capture_backend(cert.server_config.clone()).await;

    let wrong = frontend("wrong", BIND, &[&backend_addr]);
    let (server, handle) = start_server(
      binding(BIND, true, vec![wrong.clone()]),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    // replace the misnamed frontend while the server is live
    server.remove_frontend("wrong");
    let mut renamed = wrong;
    renamed.name = "test.example.com".to_string();
    server.replace_frontend(renamed).unwrap();

    let mut client = tls_client(BIND, "test.example.com", cert.roots.clone()).await.unwrap();
    client.write_all(b"Hello World").await.unwrap();
    client.shutdown().await.unwrap();
    drop(client);

    expect_payload(&mut backend_rx, b"Hello World").await;

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn many_frontends_route_exactly() {
    const BIND: &str = "127.0.0.1:55112";
    let cert = test_cert();
    let (addr1, mut rx1) = tls_capture_backend(cert.server_config.clone()).await;
    let (addr2, mut rx2) = tls_capture_backend(cert.server_config.clone()).await;

    let (server, handle) = start_server(
      binding(
        BIND,
        true,
        vec![
          frontend("test1.example.com", BIND, &[&addr1]),
          frontend("test2.example.com", BIND, &[&addr2]),
        ],
      ),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    let mut client = tls_client(BIND, "test1.example.com", cert.roots.clone()).await.unwrap();
    client.write_all(b"Hello 1").await.unwrap();
    client.shutdown().await.unwrap();
    drop(client);
    expect_payload(&mut rx1, b"Hello 1").await;

    let mut client = tls_client(BIND, "test2.example.com", cert.roots.clone()).await.unwrap();
    client.write_all(b"Hello 2").await.unwrap();
    client.shutdown().await.unwrap();
    drop(client);
    expect_payload(&mut rx2, b"Hello 2").await;

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn unknown_host_never_reaches_a_backend() {
    const BIND: &str = "127.0.0.1:55113";
    let cert = test_cert();
    let (backend_addr, mut backend_rx) = tls_capture_backend(cert.server_config.clone()).await;

    let (server, handle) = start_server(
      binding(BIND, true, vec![frontend("test.example.com", BIND, &[&backend_addr])]),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    // a.example.com is close, but no frontend matches foo.example.com
    let res = tls_client(BIND, "foo.example.com", cert.roots.clone()).await;
    assert!(res.is_err(), "handshake against an unknown vhost must fail");
    assert!(backend_rx.try_recv().is_err(), "no backend may see the connection");

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn round_robin_alternates_evenly() {
    const BIND: &str = "127.0.0.1:55114";
    let cert = test_cert();
    let (addr1, mut rx1) = tls_capture_backend(cert.server_config.clone()).await;
    let (addr2, mut rx2) = tls_capture_backend(cert.server_config.clone()).await;

    let (server, handle) = start_server(
      binding(
        BIND,
        true,
        vec![frontend("test.example.com", BIND, &[&addr1, &addr2])],
      ),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    let payload = b"Hello world!";
    for i in 0..20 {
      let mut client = tls_client(BIND, "test.example.com", cert.roots.clone()).await.unwrap();
      client.write_all(payload).await.unwrap();
      client.shutdown().await.unwrap();
      drop(client);

      // the first pick is the second backend, then strict alternation
      let rx = if i % 2 == 0 { &mut rx2 } else { &mut rx1 };
      expect_payload(rx, payload).await;
    }
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_err());

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn tls_termination_delivers_cleartext() {
    const BIND: &str = "127.0.0.1:55115";
    let cert = test_cert();
    let (backend_addr, mut backend_rx) = tcp_capture_backend().await;

    let mut front = frontend("test.example.com", BIND, &[&backend_addr]);
    front.tls_crt = "/snakeoil.crt".to_string();
    front.tls_key = "/snakeoil.key".to_string();

    let (server, handle) = start_server(
      binding(BIND, true, vec![front]),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    let mut client = tls_client(BIND, "test.example.com", cert.roots.clone()).await.unwrap();
    client.write_all(b"Hello World").await.unwrap();
    client.shutdown().await.unwrap();
    drop(client);

    // the plaintext TCP backend sees exactly the inner payload
    expect_payload(&mut backend_rx, b"Hello World").await;

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn removed_name_stops_routing() {
    const BIND: &str = "127.0.0.1:55116";
    let cert = test_cert();
    let (backend_addr, mut backend_rx) = tls_capture_backend(cert.server_config.clone()).await;

    let (server, handle) = start_server(
      binding(BIND, true, vec![frontend("test1.example.com", BIND, &[&backend_addr])]),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    server.remove_frontend("test1.example.com");
    server
      .replace_frontend(frontend("test2.example.com", BIND, &[&backend_addr]))
      .unwrap();

    // the new name reaches the backend
    let mut client = tls_client(BIND, "test2.example.com", cert.roots.clone()).await.unwrap();
    client.write_all(b"after replace").await.unwrap();
    client.shutdown().await.unwrap();
    drop(client);
    expect_payload(&mut backend_rx, b"after replace").await;

    // the removed name does not
    let res = tls_client(BIND, "test1.example.com", cert.roots.clone()).await;
    assert!(res.is_err());
    assert!(backend_rx.try_recv().is_err());

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn http_host_routing_replays_the_original_bytes() {
    const BIND: &str = "127.0.0.1:55117";
    let (backend_addr, mut backend_rx) = tcp_capture_backend().await;

    let (server, handle) = start_server(
      binding(BIND, false, vec![frontend("test.example.com", BIND, &[&backend_addr])]),
      pem_file_loader(),
    )
    .await;

    let request = b"GET /hello HTTP/1.1\r\nHost: test.example.com\r\n\r\n";
    let mut client = TcpStream::connect(BIND).await.unwrap();
    client.write_all(request).await.unwrap();
    client.shutdown().await.unwrap();

    // the backend sees the request from its first byte
    expect_payload(&mut backend_rx, request).await;
    drop(client);

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn shutdown_is_idempotent() {
    const BIND: &str = "127.0.0.1:55118";
    let binding = Binding {
      bind_addr: BIND.to_string(),
      secure: true,
      watch: true,
      frontends: HashMap::new(),
    };
    let (server, handle) = start_server(binding, pem_file_loader()).await;

    server.stop();
    server.stop();
    handle.await.unwrap().unwrap();
    // stopping a stopped server is still fine
    server.stop();
  }

  #[tokio::test]
  async fn adding_a_present_name_fails() {
    const BIND: &str = "127.0.0.1:55119";
    let cert = test_cert();
    let (backend_addr, _backend_rx) = tls_capture_backend(cert.server_config.clone()).await;

    let (server, handle) = start_server(
      binding(BIND, true, vec![frontend("test.example.com", BIND, &[&backend_addr])]),
      memory_loader(cert.server_config.clone()),
    )
    .await;

    let err = server
      .add_frontend(frontend("test.example.com", BIND, &[&backend_addr]))
      .unwrap_err();
    assert!(matches!(err, ProxyError::FrontendExists { .. }));

    server.stop();
    handle.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn run_requires_init() {
    let binding = binding("127.0.0.1:55120", true, vec![frontend("a", "127.0.0.1:55120", &["127.0.0.1:1"])]);
    let server = Server::new("test", binding);
    let err = server.run().await.unwrap_err();
    assert!(matches!(err, ProxyError::NotInitialized { .. }));
  }

  #[tokio::test]
  async fn failed_certificate_load_fails_the_add() {
    const BIND: &str = "127.0.0.1:55121";
    init_crypto_provider();

    let failing: TlsConfigLoader = Arc::new(|crt_path, _key_path| {
      Err(ProxyError::TlsMaterial {
        path: crt_path.to_string(),
        reason: "unreadable".to_string(),
      })
    });
    let (server, handle) = start_server(
      binding(BIND, true, vec![frontend("plain.example.com", BIND, &["127.0.0.1:1"])]),
      failing,
    )
    .await;

    let mut broken = frontend("broken.example.com", BIND, &["127.0.0.1:1"]);
    broken.tls_crt = "/nonexistent.crt".to_string();
    broken.tls_key = "/nonexistent.key".to_string();

    let err = server.add_frontend(broken.clone()).unwrap_err();
    assert!(matches!(err, ProxyError::TlsConfigLoad { .. }));

    // the failed add left the name unregistered
    broken.tls_crt.clear();
    broken.tls_key.clear();
    assert!(server.add_frontend(broken).is_ok());

    server.stop();
    handle.await.unwrap().unwrap();
  }
}
