use crate::config::Backend;

/* ---------------------------------------------------------- */
/// Picks the backend for the next serviced connection.
///
/// Implementations are not thread-safe: a strategy is owned and driven by
/// exactly one frontend worker, which serializes the calls.
pub(crate) trait BackendStrategy {
  fn next_backend(&mut self) -> &Backend;
}

/// Cycles through the configured backends in insertion order
pub(crate) struct RoundRobin {
  backends: Vec<Backend>,
  idx: usize,
}

impl RoundRobin {
  /// `backends` must be non-empty, which config validation guarantees
  pub(crate) fn new(backends: Vec<Backend>) -> Self {
    Self { backends, idx: 0 }
  }
}

impl BackendStrategy for RoundRobin {
  fn next_backend(&mut self) -> &Backend {
    let n = self.backends.len();
    if n == 1 {
      return &self.backends[0];
    }
    self.idx = (self.idx + 1) % n;
    &self.backends[self.idx]
  }
}

/* ---------------------------------------------------------- */
#[cfg(test)]
mod tests {
  use super::*;

  fn backend(addr: &str) -> Backend {
    Backend {
      addr: addr.to_string(),
      connect_timeout: 10_000,
    }
  }

  #[test]
  fn single_backend_is_returned_every_time() {
    let mut strategy = RoundRobin::new(vec![backend("127.0.0.1:8001")]);
    for _ in 0..5 {
      assert_eq!(strategy.next_backend().addr, "127.0.0.1:8001");
    }
  }

  #[test]
  fn cycles_in_insertion_order_starting_at_the_second() {
    let mut strategy = RoundRobin::new(vec![
      backend("127.0.0.1:8001"),
      backend("127.0.0.1:8002"),
      backend("127.0.0.1:8003"),
    ]);

    let picks: Vec<_> = (0..6).map(|_| strategy.next_backend().addr.clone()).collect();
    assert_eq!(
      picks,
      [
        "127.0.0.1:8002",
        "127.0.0.1:8003",
        "127.0.0.1:8001",
        "127.0.0.1:8002",
        "127.0.0.1:8003",
        "127.0.0.1:8001",
      ]
    );
  }

  #[test]
  fn two_backends_alternate_evenly() {
    let mut strategy = RoundRobin::new(vec![backend("127.0.0.1:8001"), backend("127.0.0.1:8002")]);
    let mut counts = [0usize; 2];
    for _ in 0..20 {
      match strategy.next_backend().addr.as_str() {
        "127.0.0.1:8001" => counts[0] += 1,
        _ => counts[1] += 1,
      }
    }
    assert_eq!(counts, [10, 10]);
  }
}
