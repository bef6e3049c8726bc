//! Debounced multi-file change watcher that drives `docmd watch`.
//!
//! Editors often save by writing a temp file and renaming it over the original,
//! which drops a watch placed on the file itself. So the watcher subscribes to
//! each containing directory (and to the file directly where the backend
//! allows it) and filters events down to the requested paths.
//!
//! Every watched path has its own debounce timer. A qualifying event cancels
//! that path's pending timer and arms a new one; the handler runs only once a
//! path has been quiet for the whole interval. Handler runs for one path are
//! single-flight: a firing that lands while a run is in progress is coalesced
//! into one trailing rerun.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use docmd_core::canonical_key;
use futures::future::BoxFuture;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Callback invoked once per settled burst, with the watched path.
pub type ChangeHandler = Arc<dyn Fn(PathBuf) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("no files to watch")]
    NoPaths,

    #[error("cannot resolve path {}: {source}", path.display())]
    InvalidPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("failed to watch {}: {source}", path.display())]
    Subscribe {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("file watcher error: {0}")]
    Backend(#[source] notify::Error),

    #[error("file watcher event channel closed")]
    ChannelClosed,
}

/// Watches a fixed set of files. Construct, then [`start`](Self::start).
#[derive(Debug)]
pub struct ChangeWatcher {
    /// Canonical table keys of the watched files
    paths: Vec<PathBuf>,
    debounce: Duration,
}

impl ChangeWatcher {
    /// Validate the requested paths. No OS resources are acquired here.
    pub fn new<I, P>(paths: I, debounce: Duration) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let key = canonical_key(path).map_err(|source| WatchError::InvalidPath {
                path: path.to_path_buf(),
                source,
            })?;
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Err(WatchError::NoPaths);
        }
        Ok(Self {
            paths: keys,
            debounce,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Subscribe to the filesystem and return a session ready to [`run`](WatchSession::run).
    ///
    /// Events that arrive between `start` and `run` are buffered.
    pub fn start(self, handler: ChangeHandler) -> Result<WatchSession, WatchError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // Receiver dropped means the session ended
            let _ = event_tx.send(result);
        })
        .map_err(WatchError::Init)?;

        let mut aliases = HashMap::new();
        let mut directories = HashSet::new();
        for key in &self.paths {
            aliases.insert(key.clone(), key.clone());
            if let Some(dir) = key.parent() {
                directories.insert(dir.to_path_buf());
                // Some backends report resolved paths (macOS /private/var)
                if let (Ok(resolved), Some(name)) = (dir.canonicalize(), key.file_name()) {
                    aliases.insert(resolved.join(name), key.clone());
                }
            }
        }

        for dir in &directories {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Subscribe {
                    path: dir.clone(),
                    source,
                })?;
            debug!("Watching directory {}", dir.display());
        }
        for key in &self.paths {
            if let Err(e) = watcher.watch(key, RecursiveMode::NonRecursive) {
                debug!("Direct watch on {} unavailable: {}", key.display(), e);
            }
        }

        info!(
            "Watching {} file(s) with {}ms debounce",
            self.paths.len(),
            self.debounce.as_millis()
        );

        Ok(WatchSession {
            _watcher: watcher,
            event_rx,
            aliases,
            debouncer: Debouncer::new(self.debounce, handler),
        })
    }
}

/// A started watch. Dropping it stops watching and abandons pending timers.
pub struct WatchSession {
    /// Backend handle (must keep alive)
    _watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    /// Reported path -> watched key
    aliases: HashMap<PathBuf, PathBuf>,
    debouncer: Debouncer,
}

impl WatchSession {
    /// Process events until a fatal watcher error.
    ///
    /// Handler failures are logged and never end the session. Cancel by
    /// dropping the future.
    pub async fn run(mut self) -> Result<(), WatchError> {
        loop {
            match self.event_rx.recv().await {
                Some(Ok(event)) => {
                    for path in qualifying_paths(&event) {
                        if let Some(key) = self.resolve(path) {
                            debug!("{:?} on {}", event.kind, key.display());
                            self.debouncer.trigger(key);
                        }
                    }
                }
                Some(Err(e)) => return Err(WatchError::Backend(e)),
                None => return Err(WatchError::ChannelClosed),
            }
        }
    }

    fn resolve(&self, reported: &Path) -> Option<PathBuf> {
        if let Some(key) = self.aliases.get(reported) {
            return Some(key.clone());
        }
        let normalized = canonical_key(reported).ok()?;
        self.aliases.get(&normalized).cloned()
    }
}

/// Watch `paths` until a fatal error. Shorthand for `new`, `start` and `run`.
pub async fn watch<I, P>(paths: I, debounce: Duration, handler: ChangeHandler) -> Result<(), WatchError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    ChangeWatcher::new(paths, debounce)?.start(handler)?.run().await
}

/// Paths of `event` that count as a content change.
///
/// Creates and modifications (data, metadata, or a rename onto the path)
/// qualify. Removals, accesses and the source side of a rename do not.
pub fn qualifying_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            &event.paths[event.paths.len().saturating_sub(1)..]
        }
        EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}

/// Per-path trailing-edge debouncer feeding a single-flight dispatcher.
///
/// Must be used from within a tokio runtime.
pub struct Debouncer {
    interval: Duration,
    timers: HashMap<PathBuf, JoinHandle<()>>,
    flights: Arc<SingleFlight>,
}

impl Debouncer {
    pub fn new(interval: Duration, handler: ChangeHandler) -> Self {
        Self {
            interval,
            timers: HashMap::new(),
            flights: Arc::new(SingleFlight::new(handler)),
        }
    }

    /// Record an event for `path`, re-arming only that path's timer.
    pub fn trigger(&mut self, path: PathBuf) {
        if let Some(pending) = self.timers.remove(&path) {
            pending.abort();
        }

        let interval = self.interval;
        let flights = Arc::clone(&self.flights);
        let target = path.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            // Detached so re-arming this path never cancels a running handler
            tokio::spawn(flights.dispatch(target));
        });
        self.timers.insert(path, timer);
    }

    /// Paths with an armed timer that has not fired yet.
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct FlightState {
    rerun: bool,
}

/// Runs the handler at most once at a time per path.
struct SingleFlight {
    handler: ChangeHandler,
    /// Paths with a run in progress
    in_flight: Mutex<HashMap<PathBuf, FlightState>>,
}

impl SingleFlight {
    fn new(handler: ChangeHandler) -> Self {
        Self {
            handler,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn dispatch(self: Arc<Self>, path: PathBuf) {
        {
            let mut in_flight = self.lock();
            if let Some(state) = in_flight.get_mut(&path) {
                debug!("Sync already running for {}, queued a rerun", path.display());
                state.rerun = true;
                return;
            }
            in_flight.insert(path.clone(), FlightState::default());
        }

        loop {
            if let Err(e) = (self.handler)(path.clone()).await {
                error!("Sync failed for {}: {:#}", path.display(), e);
            }
            if !self.take_rerun(&path) {
                break;
            }
        }
    }

    /// Consume a queued rerun, or mark the path idle when there is none.
    fn take_rerun(&self, path: &Path) -> bool {
        let mut in_flight = self.lock();
        match in_flight.get_mut(path) {
            Some(state) if state.rerun => {
                state.rerun = false;
                true
            }
            _ => {
                in_flight.remove(path);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, FlightState>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
