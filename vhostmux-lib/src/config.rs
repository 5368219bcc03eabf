use crate::{constants::DEFAULT_CONNECT_TIMEOUT_MSEC, error::ConfigError, trace::*};
use serde::Deserialize;
use std::{
  collections::{BTreeSet, HashMap},
  fs,
  path::Path,
};

/* ---------------------------------------------------------- */
/// Whole configuration file: a mapping from bind address to [Binding].
/// The file is YAML unless its extension is `.json`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Configuration(pub HashMap<String, Binding>);

/// One listening endpoint and the virtual hosts served from it
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Binding {
  /// Listen address; defaults to the map key when omitted
  #[serde(default, alias = "bindAddr")]
  pub bind_addr: String,

  /// true: classify by TLS SNI; false: classify by HTTP Host
  #[serde(default)]
  pub secure: bool,

  /// Track a per-frontend configuration directory for this binding
  #[serde(default)]
  pub watch: bool,

  /// Inline frontends, keyed by virtual-host name
  #[serde(default)]
  pub frontends: HashMap<String, Frontend>,
}

/// A named virtual host under a binding
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Frontend {
  /// Match key against the classified hostname; the map key or the filename stem
  #[serde(skip)]
  pub name: String,

  /// Bind address of the owning binding
  #[serde(skip)]
  pub bound_addr: String,

  /// Ordered backend list; insertion order is the round-robin order
  #[serde(default)]
  pub backends: Vec<Backend>,

  /// Recognized but not implemented; round-robin is always used
  #[serde(default)]
  pub strategy: String,

  /// Recognized but not implemented
  #[serde(default)]
  pub autocert: bool,

  /// Certificate path; set together with `tls_key` to terminate TLS locally
  #[serde(default, alias = "tlsCrt")]
  pub tls_crt: String,

  /// Private key path
  #[serde(default, alias = "tlsKey")]
  pub tls_key: String,
}

/// A TCP endpoint dialed for served connections
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Backend {
  /// Dial address, `host:port`
  #[serde(default)]
  pub addr: String,

  /// Connect timeout in milliseconds; 0 or absent means the 10000 ms default
  #[serde(default, alias = "connectTimeout")]
  pub connect_timeout: u64,
}

/* ---------------------------------------------------------- */
enum Format {
  Yaml,
  Json,
}

impl Format {
  fn for_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Format::Json,
      _ => Format::Yaml,
    }
  }
}

/// Deserialize with a warning for unrecognized fields, so config typos surface in the log
fn deserialize_checked<T: serde::de::DeserializeOwned>(buf: &str, format: Format) -> Result<T, ConfigError> {
  let mut unused = BTreeSet::new();
  let res = match format {
    Format::Yaml => serde_ignored::deserialize(serde_yaml::Deserializer::from_str(buf), |path| {
      unused.insert(path.to_string());
    })
    .map_err(|e| ConfigError::Parse(e.to_string())),
    Format::Json => {
      let mut de = serde_json::Deserializer::from_str(buf);
      serde_ignored::deserialize(&mut de, |path| {
        unused.insert(path.to_string());
      })
      .map_err(|e| ConfigError::Parse(e.to_string()))
    }
  };

  if !unused.is_empty() {
    let fields = unused.iter().fold(String::new(), |acc, x| acc + x + "\n");
    warn!("Configuration contains unsupported fields. Check typos:\n{fields}");
  }
  res
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
  fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })
}

/* ---------------------------------------------------------- */
impl Configuration {
  /// Parse and validate a YAML configuration
  pub fn parse_yaml(buf: &str) -> Result<Self, ConfigError> {
    let mut config: Self = deserialize_checked(buf, Format::Yaml)?;
    config.set_defaults_and_validate()?;
    Ok(config)
  }

  /// Parse and validate a JSON configuration
  pub fn parse_json(buf: &str) -> Result<Self, ConfigError> {
    let mut config: Self = deserialize_checked(buf, Format::Json)?;
    config.set_defaults_and_validate()?;
    Ok(config)
  }

  /// Parse and validate a configuration file, YAML or JSON by extension
  pub fn parse_file(path: &Path) -> Result<Self, ConfigError> {
    let buf = read_file(path)?;
    let mut config: Self = deserialize_checked(&buf, Format::for_path(path))?;
    config.set_defaults_and_validate()?;
    Ok(config)
  }

  /// Inject the map keys and defaults, then validate every binding
  fn set_defaults_and_validate(&mut self) -> Result<(), ConfigError> {
    for (key, binding) in self.0.iter_mut() {
      if binding.bind_addr.is_empty() {
        binding.bind_addr = key.clone();
      }

      if !binding.watch && binding.frontends.is_empty() {
        return Err(ConfigError::NoFrontends {
          bind_addr: key.clone(),
        });
      }

      for (name, front) in binding.frontends.iter_mut() {
        front.name = name.clone();
        front.bound_addr = binding.bind_addr.clone();
        front.set_defaults_and_validate()?;
      }
    }
    Ok(())
  }
}

impl Frontend {
  /// Parse a single-frontend file (one watched directory entry).
  /// `name` and `bound_addr` are left empty; the watcher fills them in
  /// from the filename stem and the directory's bind address.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let buf = read_file(path)?;
    deserialize_checked(&buf, Format::for_path(path))
  }

  /// Inject backend defaults and validate
  pub fn set_defaults_and_validate(&mut self) -> Result<(), ConfigError> {
    if self.backends.is_empty() {
      return Err(ConfigError::NoBackends {
        bind_addr: self.bound_addr.clone(),
        name: self.name.clone(),
      });
    }

    if !self.strategy.is_empty() {
      debug!(
        "Frontend '{}': strategy '{}' is not implemented, round-robin is used",
        self.name, self.strategy
      );
    }
    if self.autocert {
      warn!("Frontend '{}': autocert is not implemented, field ignored", self.name);
    }

    for back in self.backends.iter_mut() {
      if back.connect_timeout == 0 {
        back.connect_timeout = DEFAULT_CONNECT_TIMEOUT_MSEC;
      }

      if back.addr.is_empty() {
        return Err(ConfigError::EmptyBackendAddr {
          bind_addr: self.bound_addr.clone(),
          name: self.name.clone(),
        });
      }
    }
    Ok(())
  }

  /// TLS material is configured, so TLS is terminated locally.
  /// Loading fails later unless both paths are usable.
  pub fn terminates_tls(&self) -> bool {
    !self.tls_crt.is_empty() || !self.tls_key.is_empty()
  }
}

/* ---------------------------------------------------------- */
