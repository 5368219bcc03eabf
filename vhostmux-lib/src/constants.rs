use std::time::Duration;

/// TCP backlog size
pub(crate) const TCP_BACKLOG: u32 = 1024;

/// Budget for classifying a freshly accepted connection by hostname.
/// The full ClientHello (or HTTP request head) must arrive within this window.
pub(crate) const MUX_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default backend connect timeout in milliseconds, injected when the
/// configuration leaves `connect_timeout` absent or zero.
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MSEC: u64 = 10_000;

/// Queue capacity of a per-frontend listener registered with the muxer
pub(crate) const FRONTEND_QUEUE_CAPACITY: usize = 128;

/// Capacity of the muxer's classification-error channel
pub(crate) const MUX_ERROR_CHANNEL_CAPACITY: usize = 128;

/// Capacity of the watcher's file-event channel
pub(crate) const WATCH_CHANNEL_CAPACITY: usize = 128;

/// Pause before re-reading a frontend file after a create/write event,
/// so editors that write-then-close are observed as a complete file
pub(crate) const WATCH_DEBOUNCE: Duration = Duration::from_millis(1);

/// Upper bound on a TLS record accepted during classification.
/// The TLS record payload limit is 2^14 bytes plus expansion (RFC 8446 §5.1).
pub(crate) const TLS_RECORD_MAX_SIZE: usize = 16_384 + 256;

/// Upper bound on the HTTP request head read during classification
pub(crate) const HTTP_HEAD_MAX_SIZE: usize = 8_192;

/// Diagnostic payload written to a client whose handshake could not be parsed
pub(crate) const BAD_REQUEST_PAYLOAD: &[u8] = b"bad request";

/// Diagnostic payload written to a client whose hostname matched no frontend
pub(crate) const NOT_FOUND_PAYLOAD: &[u8] = b"vhost not found";
