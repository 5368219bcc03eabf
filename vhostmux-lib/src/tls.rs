use crate::error::ProxyError;
use rustls::ServerConfig;
use std::{fs::File, io::BufReader, sync::Arc};

/* ---------------------------------------------------------- */
/// Injected capability that turns a certificate path and key path into a TLS
/// server configuration. The default reads PEM files from disk; tests
/// substitute an in-memory implementation.
pub type TlsConfigLoader = Arc<dyn Fn(&str, &str) -> Result<ServerConfig, ProxyError> + Send + Sync>;

/// The PEM-file backed loader used unless one is injected
pub fn pem_file_loader() -> TlsConfigLoader {
  Arc::new(|crt_path, key_path| load_tls_server_config(crt_path, key_path))
}

/// Read a PEM certificate chain and private key and build a `ServerConfig`
pub fn load_tls_server_config(crt_path: &str, key_path: &str) -> Result<ServerConfig, ProxyError> {
  let certs = rustls_pemfile::certs(&mut open(crt_path)?)
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| ProxyError::TlsMaterial {
      path: crt_path.to_string(),
      reason: e.to_string(),
    })?;
  if certs.is_empty() {
    return Err(ProxyError::TlsMaterial {
      path: crt_path.to_string(),
      reason: "no certificate found".to_string(),
    });
  }

  let key = rustls_pemfile::private_key(&mut open(key_path)?)
    .map_err(|e| ProxyError::TlsMaterial {
      path: key_path.to_string(),
      reason: e.to_string(),
    })?
    .ok_or_else(|| ProxyError::TlsMaterial {
      path: key_path.to_string(),
      reason: "no private key found".to_string(),
    })?;

  ServerConfig::builder()
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| ProxyError::TlsMaterial {
      path: crt_path.to_string(),
      reason: e.to_string(),
    })
}

fn open(path: &str) -> Result<BufReader<File>, ProxyError> {
  let file = File::open(path).map_err(|e| ProxyError::TlsMaterial {
    path: path.to_string(),
    reason: e.to_string(),
  })?;
  Ok(BufReader::new(file))
}

/* ---------------------------------------------------------- */
#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn loads_a_pem_certificate_and_key() {
    let cert = rcgen::generate_simple_self_signed(vec!["test.example.com".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let crt_path = dir.path().join("test.crt");
    let key_path = dir.path().join("test.key");
    std::fs::write(&crt_path, cert.cert.pem()).unwrap();
    std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

    let config = load_tls_server_config(crt_path.to_str().unwrap(), key_path.to_str().unwrap());
    assert!(config.is_ok());
  }

  #[test]
  fn missing_files_fail() {
    let err = load_tls_server_config("/nonexistent.crt", "/nonexistent.key").unwrap_err();
    assert!(matches!(err, ProxyError::TlsMaterial { .. }));
  }

  #[test]
  fn empty_pem_fails() {
    let dir = tempfile::tempdir().unwrap();
    let crt_path = dir.path().join("empty.crt");
    let key_path = dir.path().join("empty.key");
    std::fs::write(&crt_path, "").unwrap();
    std::fs::write(&key_path, "").unwrap();

    let err = load_tls_server_config(crt_path.to_str().unwrap(), key_path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ProxyError::TlsMaterial { .. }));
  }
}
