#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod log;

use crate::{config::parse_opts, log::*};
use std::{path::Path, sync::Arc};
use vhostmux_lib::{ConfigWatcher, Configuration, Server};

fn main() {
  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name("vhostmux");
  let runtime = runtime_builder.build().unwrap();

  runtime.block_on(async {
    init_logger();

    let opts = match parse_opts() {
      Ok(opts) => opts,
      Err(e) => {
        eprintln!("{e}");
        std::process::exit(1);
      }
    };

    if let Err(e) = entrypoint(&opts.config_file_path).await {
      error!("{e}");
      std::process::exit(1);
    }
    std::process::exit(0);
  });
}

/// Entrypoint for the service: one server per binding, plus the shared
/// frontend-directory watcher when any binding asks for it
async fn entrypoint(config_path: &str) -> Result<(), anyhow::Error> {
  info!("Starting vhostmux");
  let config = Configuration::parse_file(Path::new(config_path))?;

  let base_dir = Path::new(config_path).parent().map(Path::to_path_buf).unwrap_or_default();
  let mut watcher: Option<ConfigWatcher> = None;
  let mut pending = Vec::new();

  for (key, binding) in config.0 {
    let watch = binding.watch;
    let bind_addr = binding.bind_addr.clone();
    let server = Arc::new(Server::new(key.clone(), binding));
    server.init()?;

    if watch {
      // lazy init: one watcher serves every watched binding
      if watcher.is_none() {
        watcher = Some(ConfigWatcher::new()?);
      }
      if let Some(cw) = watcher.as_mut() {
        let dir = base_dir.join(&key);
        std::fs::create_dir_all(&dir)?;
        cw.add(&dir, &bind_addr, server.clone())?;
      }
    }

    let handle = tokio::spawn({
      let server = server.clone();
      async move { server.run().await }
    });
    pending.push((key, server, handle));
  }

  // Every server must come up before the watcher starts mutating them
  let mut servers = Vec::new();
  for (key, server, mut handle) in pending {
    tokio::select! {
      _ = server.ready() => servers.push((server, handle)),
      res = &mut handle => {
        let reason = match res {
          Ok(Err(e)) => e.to_string(),
          Ok(Ok(())) => "exited before becoming ready".to_string(),
          Err(e) => e.to_string(),
        };
        anyhow::bail!("{key}: {reason}");
      }
    }
  }

  if let Some(watcher) = watcher {
    info!("Watching frontend directories");
    tokio::spawn(watcher.start());
  }

  tokio::signal::ctrl_c().await?;
  info!("Shutting down");
  for (server, _) in &servers {
    server.stop();
  }
  for (_server, handle) in servers {
    if let Err(e) = handle.await? {
      warn!("Server exited with error: {e}");
    }
  }
  Ok(())
}
