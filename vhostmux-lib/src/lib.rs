//! Hostname-multiplexing layer-4 reverse proxy.
//!
//! A [`Server`] owns one listening endpoint and demultiplexes every accepted
//! TCP connection onto a virtual-host frontend: TLS clients are classified by
//! the SNI extension of their ClientHello, plaintext HTTP clients by the
//! `Host` header. Each frontend proxies its connections to a round-robin
//! choice of its backends, optionally terminating TLS locally first. A
//! [`ConfigWatcher`] keeps the frontend registry in sync with per-frontend
//! files on disk.

mod backend;
pub mod config;
mod constants;
mod error;
mod frontend;
mod muxer;
mod server;
mod stream;
mod tls;
mod trace;
pub mod watcher;

pub use config::{Backend, Binding, Configuration, Frontend};
pub use error::{ConfigError, MuxError, ProxyError};
pub use server::Server;
pub use stream::MuxedStream;
pub use tls::{load_tls_server_config, pem_file_loader, TlsConfigLoader};
pub use watcher::{ConfigWatcher, FileEvent, FileEventKind, FrontendUpdater};
