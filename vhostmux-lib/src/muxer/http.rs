use crate::{constants::HTTP_HEAD_MAX_SIZE, error::SniffError};
use bytes::BytesMut;
use tokio::{io::AsyncReadExt, net::TcpStream};

/// Read the HTTP request head (request line and headers, up to the first
/// blank line) into `buf` and extract the `Host` header value, lowercased
/// with any port suffix stripped. The consumed bytes stay in `buf`,
/// including any body bytes that arrived with the head.
pub(crate) async fn read_request_host(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<String, SniffError> {
  loop {
    if let Some(head_len) = head_end(buf) {
      return parse_host(&buf[..head_len]);
    }
    if buf.len() >= HTTP_HEAD_MAX_SIZE {
      return Err(SniffError::Malformed("HTTP request head too large"));
    }
    if stream.read_buf(buf).await? == 0 {
      return Err(SniffError::UnexpectedEof);
    }
  }
}

fn head_end(buf: &[u8]) -> Option<usize> {
  buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

pub(crate) fn parse_host(head: &[u8]) -> Result<String, SniffError> {
  let head = std::str::from_utf8(head).map_err(|_| SniffError::Malformed("request head is not valid UTF-8"))?;

  let mut lines = head.split("\r\n");
  let request_line = lines.next().unwrap_or_default();
  let mut parts = request_line.split_ascii_whitespace();
  let (Some(_method), Some(_target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
    return Err(SniffError::Malformed("malformed HTTP request line"));
  };
  if !version.starts_with("HTTP/") || parts.next().is_some() {
    return Err(SniffError::Malformed("malformed HTTP request line"));
  }

  for line in lines {
    if line.is_empty() {
      break;
    }
    let Some((name, value)) = line.split_once(':') else {
      continue;
    };
    if name.eq_ignore_ascii_case("host") {
      let host = strip_port(value.trim());
      if host.is_empty() {
        return Err(SniffError::Malformed("empty Host header"));
      }
      return Ok(host.to_ascii_lowercase());
    }
  }

  Err(SniffError::Malformed("missing Host header"))
}

/// Drop a `:port` suffix; bracketed IPv6 literals lose their brackets too
fn strip_port(host: &str) -> &str {
  if let Some(rest) = host.strip_prefix('[') {
    if let Some(end) = rest.find(']') {
      return &rest[..end];
    }
  }
  match host.rfind(':') {
    Some(i) if i + 1 < host.len() && host[i + 1..].bytes().all(|b| b.is_ascii_digit()) => &host[..i],
    _ => host,
  }
}

/* ---------------------------------------------------------- */
#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_host() {
    let head = b"GET /index.html HTTP/1.1\r\nAccept: */*\r\nHost: test.example.com\r\n\r\n";
    assert_eq!(parse_host(head).unwrap(), "test.example.com");
  }

  #[test]
  fn host_matching_is_case_insensitive_and_lowercases() {
    let head = b"GET / HTTP/1.0\r\nhOsT: TEST.Example.COM\r\n\r\n";
    assert_eq!(parse_host(head).unwrap(), "test.example.com");
  }

  #[test]
  fn port_suffix_is_stripped() {
    let head = b"GET / HTTP/1.1\r\nHost: test.example.com:8080\r\n\r\n";
    assert_eq!(parse_host(head).unwrap(), "test.example.com");

    let head = b"GET / HTTP/1.1\r\nHost: [::1]:8080\r\n\r\n";
    assert_eq!(parse_host(head).unwrap(), "::1");
  }

  #[test]
  fn missing_host_is_rejected() {
    let head = b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n";
    assert!(matches!(parse_host(head), Err(SniffError::Malformed("missing Host header"))));
  }

  #[test]
  fn malformed_request_line_is_rejected() {
    for head in [&b"\x16\x03\x01\x00\x10garbage\r\n\r\n"[..], &b"GET /\r\nHost: a\r\n\r\n"[..]] {
      assert!(parse_host(head).is_err());
    }
  }

  #[tokio::test]
  async fn reads_the_head_from_a_socket() {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request = b"POST /submit HTTP/1.1\r\nHost: b.example.com\r\nContent-Length: 4\r\n\r\nbody";

    let client = tokio::spawn(async move {
      let mut stream = TcpStream::connect(addr).await.unwrap();
      stream.write_all(request).await.unwrap();
      stream
    });

    let (mut accepted, _) = listener.accept().await.unwrap();
    let mut buf = BytesMut::new();
    let host = read_request_host(&mut accepted, &mut buf).await.unwrap();
    assert_eq!(host, "b.example.com");
    // body bytes that arrived with the head are retained for replay
    assert!(buf.starts_with(b"POST /submit"));

    drop(client.await.unwrap());
  }
}
