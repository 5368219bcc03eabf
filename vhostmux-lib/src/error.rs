use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors surfaced by server lifecycle and frontend registry operations
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
  #[error("{server}: run() requires init() first")]
  NotInitialized { server: String },

  #[error("{server}: already running")]
  AlreadyRunning { server: String },

  #[error("invalid bind address '{addr}': {source}")]
  InvalidBindAddr {
    addr: String,
    #[source]
    source: std::net::AddrParseError,
  },

  #[error("failed to bind {addr}: {source}")]
  BindFailed {
    addr: SocketAddr,
    #[source]
    source: std::io::Error,
  },

  #[error("frontend '{name}' already exists")]
  FrontendExists { name: String },

  #[error("muxer is not running")]
  MuxerNotRunning,

  #[error("failed to load TLS configuration for frontend '{name}': {reason}")]
  TlsConfigLoad { name: String, reason: String },

  #[error("invalid TLS material in {path}: {reason}")]
  TlsMaterial { path: String, reason: String },

  #[error("already watching directory {}", dir.display())]
  AlreadyWatching { dir: PathBuf },

  #[error("file watcher error: {0}")]
  Watch(#[from] notify::Error),

  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// Configuration load and validation errors, fatal to process startup
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("error parsing configuration: {0}")]
  Parse(String),

  #[error("{bind_addr}: must specify at least one frontend")]
  NoFrontends { bind_addr: String },

  #[error("{bind_addr}: must specify at least one backend for frontend '{name}'")]
  NoBackends { bind_addr: String, name: String },

  #[error("{bind_addr}: must specify an addr for each backend on frontend '{name}'")]
  EmptyBackendAddr { bind_addr: String, name: String },
}

/// Classification failures drained from the muxer's error channel.
/// Only [`MuxError::Closed`] terminates the drain loop.
#[derive(thiserror::Error, Debug)]
pub enum MuxError {
  #[error("bad request from {src_addr}: {reason}")]
  BadRequest { src_addr: SocketAddr, reason: String },

  #[error("no frontend registered for host '{hostname}' (from {src_addr})")]
  NotFound { src_addr: SocketAddr, hostname: String },

  #[error("muxer closed")]
  Closed,
}

/// Why hostname extraction from the peeked handshake bytes failed
#[derive(thiserror::Error, Debug)]
pub(crate) enum SniffError {
  #[error("connection closed before the handshake completed")]
  UnexpectedEof,

  #[error("i/o error while reading the handshake: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Malformed(&'static str),
}
