use crate::{constants::TLS_RECORD_MAX_SIZE, error::SniffError, trace::*};
use bytes::BytesMut;
use tokio::{io::AsyncReadExt, net::TcpStream};

const TLS_RECORD_HEADER_LEN: usize = 5;
const TLS_HANDSHAKE_CONTENT_TYPE: u8 = 0x16;
const TLS_HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 0x01;
const TLS_EXTENSION_SERVER_NAME: usize = 0x0000;
const SNI_NAME_TYPE_HOST: u8 = 0x00;

/// Read the first TLS record from the socket into `buf` and extract the SNI
/// hostname, lowercased. The consumed bytes stay in `buf` so the consumer can
/// replay the handshake from offset 0.
pub(crate) async fn read_client_hello(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<String, SniffError> {
  // TLS record header: content type (1), legacy version (2), length (2)
  // https://datatracker.ietf.org/doc/html/rfc8446#section-5.1
  fill(stream, buf, TLS_RECORD_HEADER_LEN).await?;
  if buf[0] != TLS_HANDSHAKE_CONTENT_TYPE {
    return Err(SniffError::Malformed("not a TLS handshake record"));
  }
  if buf[1] < 3 {
    // Omit the legacy SSL
    return Err(SniffError::Malformed("unsupported TLS record version"));
  }
  let record_len = be16(&buf[3..5]);
  if record_len == 0 || record_len > TLS_RECORD_MAX_SIZE {
    return Err(SniffError::Malformed("TLS record length out of range"));
  }

  fill(stream, buf, TLS_RECORD_HEADER_LEN + record_len).await?;
  debug!("TLS record received, payload length {record_len}");
  parse_client_hello(&buf[TLS_RECORD_HEADER_LEN..TLS_RECORD_HEADER_LEN + record_len])
}

/// Read from the socket until `buf` holds at least `target` bytes
async fn fill(stream: &mut TcpStream, buf: &mut BytesMut, target: usize) -> Result<(), SniffError> {
  while buf.len() < target {
    if stream.read_buf(buf).await? == 0 {
      return Err(SniffError::UnexpectedEof);
    }
  }
  Ok(())
}

/// Walk a handshake message down to the server_name extension
/// https://datatracker.ietf.org/doc/html/rfc8446#section-4.1.2
/// https://tools.ietf.org/html/rfc5246#section-7.4
pub(crate) fn parse_client_hello(hello: &[u8]) -> Result<String, SniffError> {
  let truncated = || SniffError::Malformed("truncated ClientHello");

  // Handshake message header: msg_type (1), length (3)
  if hello.len() < 4 {
    return Err(truncated());
  }
  if hello[0] != TLS_HANDSHAKE_TYPE_CLIENT_HELLO {
    return Err(SniffError::Malformed("record does not carry a ClientHello"));
  }
  let body_len = ((hello[1] as usize) << 16) + be16(&hello[2..4]);
  let body = hello
    .get(4..4 + body_len)
    .ok_or(SniffError::Malformed("ClientHello spans multiple records"))?;

  // Fixed-length fields: version (2) + random (32)
  let mut pos = 34;

  // Session ID
  let session_id_len = *body.get(pos).ok_or_else(truncated)? as usize;
  pos += 1 + session_id_len;

  // Cipher suites
  let cipher_suites_len = be16(body.get(pos..pos + 2).ok_or_else(truncated)?);
  if cipher_suites_len < 2 || cipher_suites_len % 2 != 0 {
    return Err(SniffError::Malformed("invalid cipher suite list"));
  }
  pos += 2 + cipher_suites_len;

  // Compression methods
  let compression_len = *body.get(pos).ok_or_else(truncated)? as usize;
  if compression_len < 1 {
    return Err(SniffError::Malformed("invalid compression method list"));
  }
  pos += 1 + compression_len;

  // Extensions: 2-byte total length, then type (2) + length (2) + payload each
  // https://datatracker.ietf.org/doc/html/rfc8446#section-4.2
  let extensions_len = be16(body.get(pos..pos + 2).ok_or_else(truncated)?);
  pos += 2;
  let extensions = body.get(pos..pos + extensions_len).ok_or_else(truncated)?;

  let mut pos = 0;
  while pos + 4 <= extensions.len() {
    let ext_type = be16(&extensions[pos..pos + 2]);
    let ext_len = be16(&extensions[pos + 2..pos + 4]);
    pos += 4;
    let ext = extensions.get(pos..pos + ext_len).ok_or_else(truncated)?;
    if ext_type == TLS_EXTENSION_SERVER_NAME {
      return parse_server_name(ext);
    }
    pos += ext_len;
  }

  Err(SniffError::Malformed("no server_name extension in ClientHello"))
}

/// ServerNameList: 2-byte list length, then name_type (1) + length (2) + name
/// https://datatracker.ietf.org/doc/html/rfc6066#section-3
fn parse_server_name(ext: &[u8]) -> Result<String, SniffError> {
  let truncated = || SniffError::Malformed("truncated server_name extension");

  let list_len = be16(ext.get(0..2).ok_or_else(truncated)?);
  let list = ext.get(2..2 + list_len).ok_or_else(truncated)?;

  let mut pos = 0;
  while pos + 3 <= list.len() {
    let name_type = list[pos];
    let name_len = be16(&list[pos + 1..pos + 3]);
    pos += 3;
    let name = list.get(pos..pos + name_len).ok_or_else(truncated)?;
    if name_type == SNI_NAME_TYPE_HOST {
      if name.is_empty() || !name.is_ascii() {
        return Err(SniffError::Malformed("server name is not printable ASCII"));
      }
      // is_ascii implies valid UTF-8
      let host = std::str::from_utf8(name).map_err(|_| SniffError::Malformed("server name is not printable ASCII"))?;
      return Ok(host.to_ascii_lowercase());
    }
    pos += name_len;
  }

  Err(SniffError::Malformed("no host_name entry in server_name extension"))
}

fn be16(b: &[u8]) -> usize {
  ((b[0] as usize) << 8) + b[1] as usize
}

/* ---------------------------------------------------------- */
