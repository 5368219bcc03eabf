use crate::{
  config::Frontend,
  constants::{WATCH_CHANNEL_CAPACITY, WATCH_DEBOUNCE},
  error::ProxyError,
  trace::*,
};
use notify::{
  event::{ModifyKind, RenameMode},
  EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};
use tokio::sync::mpsc;

/* ---------------------------------------------------------- */
/// One-way capability through which the watcher reconfigures a server.
/// Handed in at [`ConfigWatcher::add`] time; implemented by `Server`.
pub trait FrontendUpdater: Send + Sync {
  fn replace_frontend(&self, frontend: Frontend) -> Result<(), ProxyError>;
  fn remove_frontend(&self, name: &str);
}

/// What happened to a file in a watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
  Create,
  Write,
  /// The file is no longer at this path
  Rename,
}

/// Abstract filesystem event consumed by the watcher loop
#[derive(Debug, Clone)]
pub struct FileEvent {
  pub path: PathBuf,
  pub kind: FileEventKind,
}

struct WatchEntry {
  bind_addr: String,
  updater: Arc<dyn FrontendUpdater>,
}

/* ---------------------------------------------------------- */
/// Keeps per-frontend files in sync with the live frontend registry.
///
/// Each watched directory belongs to one binding. A file `name.yml` (or
/// `.json`) holds a single-frontend config; its filename stem is the
/// virtual-host name. Creating or writing the file replaces the frontend,
/// renaming it away removes it.
pub struct ConfigWatcher {
  watching: HashMap<PathBuf, WatchEntry>,
  events: mpsc::Receiver<FileEvent>,
  /// Present when events come from the filesystem rather than a test source
  _watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
  /// Watcher fed by filesystem notifications
  pub fn new() -> Result<Self, ProxyError> {
    let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
    let watcher = RecommendedWatcher::new(
      move |res: Result<notify::Event, notify::Error>| match res {
        Ok(event) => {
          for event in translate_events(event) {
            if tx.blocking_send(event).is_err() {
              // watcher loop is gone; nothing left to notify
              return;
            }
          }
        }
        Err(e) => error!("Config watcher error: {e}"),
      },
      notify::Config::default(),
    )?;
    Ok(Self {
      watching: HashMap::new(),
      events: rx,
      _watcher: Some(watcher),
    })
  }

  /// Watcher fed by an injected event source; used in tests
  pub fn with_event_source(events: mpsc::Receiver<FileEvent>) -> Self {
    Self {
      watching: HashMap::new(),
      events,
      _watcher: None,
    }
  }

  /// Start watching `dir` (non-recursively) for the binding at `bind_addr`.
  /// The same directory may not be added twice.
  pub fn add(&mut self, dir: &Path, bind_addr: &str, updater: Arc<dyn FrontendUpdater>) -> Result<(), ProxyError> {
    let dir = dir
      .canonicalize()
      .map_err(|e| ProxyError::Watch(notify::Error::io(e).add_path(dir.to_path_buf())))?;
    if self.watching.contains_key(&dir) {
      return Err(ProxyError::AlreadyWatching { dir });
    }
    if let Some(watcher) = self._watcher.as_mut() {
      watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    }
    debug!("Watching {} for {bind_addr}", dir.display());
    self.watching.insert(
      dir,
      WatchEntry {
        bind_addr: bind_addr.to_string(),
        updater,
      },
    );
    Ok(())
  }

  /// Process every file already present, then consume events until the
  /// source closes
  pub async fn start(mut self) {
    self.update_all();

    while let Some(event) = self.events.recv().await {
      debug!("Watcher event {:?} on {}", event.kind, event.path.display());
      match event.kind {
        FileEventKind::Create | FileEventKind::Write => {
          // editors write then close; give the file a moment to be complete
          tokio::time::sleep(WATCH_DEBOUNCE).await;
          self.update_frontend(&event.path, false);
        }
        FileEventKind::Rename => self.update_frontend(&event.path, true),
      }
    }
    debug!("Config watcher stopped");
  }

  /// Synthetic create pass over every watched directory
  fn update_all(&self) {
    for dir in self.watching.keys() {
      let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
          warn!("Failed to read files in {}: {e}", dir.display());
          continue;
        }
      };
      for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
          self.update_frontend(&path, false);
        }
      }
    }
  }

  fn update_frontend(&self, path: &Path, removed: bool) {
    let Some(parent) = path.parent() else {
      return;
    };
    let dir = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    let Some(entry) = self.watching.get(&dir) else {
      warn!("No watch entry for directory {}", dir.display());
      return;
    };
    let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
      return;
    };

    if removed {
      debug!("Removing frontend '{name}' on {}", entry.bind_addr);
      entry.updater.remove_frontend(name);
      return;
    }

    let mut front = match Frontend::from_file(path) {
      Ok(front) => front,
      Err(e) => {
        error!("Failed to read frontend config {}: {e}", path.display());
        return;
      }
    };
    front.name = name.to_string();
    front.bound_addr = entry.bind_addr.clone();
    if let Err(e) = front.set_defaults_and_validate() {
      error!("Invalid frontend config {}: {e}", path.display());
      return;
    }

    match entry.updater.replace_frontend(front) {
      Ok(()) => info!("Frontend '{name}' updated on {}", entry.bind_addr),
      Err(e) => error!("Failed to replace frontend '{name}': {e}"),
    }
  }
}

/// Map a notify event onto the create/write/rename model. A plain removal
/// stops routing the same way a rename-away does.
fn translate_events(event: notify::Event) -> Vec<FileEvent> {
  if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
    // paths are [from, to]
    let mut paths = event.paths.into_iter();
    let mut out = Vec::new();
    if let Some(from) = paths.next() {
      out.push(FileEvent {
        path: from,
        kind: FileEventKind::Rename,
      });
    }
    if let Some(to) = paths.next() {
      out.push(FileEvent {
        path: to,
        kind: FileEventKind::Create,
      });
    }
    return out;
  }

  let kind = match event.kind {
    EventKind::Create(_) => FileEventKind::Create,
    EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileEventKind::Create,
    EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Rename,
    EventKind::Modify(_) => FileEventKind::Write,
    EventKind::Remove(_) => FileEventKind::Rename,
    _ => return Vec::new(),
  };
  event
    .paths
    .into_iter()
    .map(|path| FileEvent { path, kind })
    .collect()
}

/* ---------------------------------------------------------- */
