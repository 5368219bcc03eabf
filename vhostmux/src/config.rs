use anyhow::anyhow;
use clap::Arg;

/// Parsed options
pub struct Opts {
  /// Configuration file path
  pub config_file_path: String,
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  let _ = include_str!("../Cargo.toml");
  let options = clap::command!()
    .about(
      "vhostmux is a layer-4 reverse proxy that multiplexes TCP connections on a single \
       port by the virtual-host name each client advertises: the SNI extension of a TLS \
       ClientHello, or the Host header of a plaintext HTTP request. This allows many \
       backend applications to be served from one listening address.",
    )
    .arg(
      Arg::new("config_file")
        .value_name("FILE")
        .required(true)
        .help("Configuration file path like ./config.yml (YAML, or JSON by extension)"),
    );
  let matches = options.try_get_matches().map_err(|e| anyhow!(e))?;

  let config_file_path = matches
    .get_one::<String>("config_file")
    .ok_or_else(|| anyhow!("config file is required"))?
    .to_owned();

  Ok(Opts { config_file_path })
}
