//! File growth detection using the notify crate plus a fallback poll.

use crate::config::TailConfig;
use crate::error::{Error, Result};
use crate::subscription::{Subscribers, Subscription};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Signal raised when the monitored file has grown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequired;

/// Watches one file at a time and signals when it grows.
///
/// Growth is detected from OS change events and, as a safety net for
/// filesystems where those events get lost, from a poll every
/// [`TailConfig::poll_interval`]. Growth observed within
/// [`TailConfig::debounce`] of the first detection is reported as one signal.
/// A file that shrinks or stays the same size raises nothing.
pub struct ChangeNotifier {
    config: TailConfig,
    state: Arc<Mutex<NotifierState>>,
    signals: Arc<Subscribers<UpdateRequired>>,
}

#[derive(Default)]
struct NotifierState {
    active: Option<ActiveWatch>,
    next_generation: u64,
}

struct ActiveWatch {
    path: PathBuf,
    last_known_len: u64,
    generation: u64,
    _watcher: Option<RecommendedWatcher>,
    shutdown_tx: broadcast::Sender<()>,
    _task_handle: JoinHandle<()>,
}

/// Outcome of re-checking the file size.
#[derive(Debug, PartialEq, Eq)]
enum Growth {
    Grew(u64),
    Unchanged,
    /// The monitoring task belongs to a watch that has since been replaced or stopped.
    Stale,
}

impl ChangeNotifier {
    pub fn new(config: TailConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
            signals: Arc::default(),
        }
    }

    /// Subscribes to [`UpdateRequired`] signals. Drop the subscription to unsubscribe.
    pub fn subscribe(&self) -> Subscription<UpdateRequired> {
        self.signals.subscribe()
    }

    /// Starts monitoring `path`.
    ///
    /// A no-op if `path` is already monitored; any other monitored file is
    /// released first. The current length of the file is the baseline for
    /// detecting growth.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file_path = path.as_ref().to_path_buf();
        let mut state = self.lock_state();

        if let Some(active) = &state.active {
            if active.path == file_path {
                return Ok(());
            }
        }
        if let Some(previous) = state.active.take() {
            stop_watch(previous);
        }

        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidPath {
                message: format!("{} has no file name", file_path.display()),
            })?;

        let last_known_len = match std::fs::metadata(&file_path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: file_path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = if self.config.watch_events {
            Some(start_watching(&file_path, event_tx)?)
        } else {
            None
        };

        let generation = state.next_generation;
        state.next_generation += 1;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let monitor = Monitor {
            state: Arc::clone(&self.state),
            signals: Arc::clone(&self.signals),
            generation,
            file_name,
            config: self.config.clone(),
        };
        let task_handle = tokio::spawn(monitor.run(event_rx, shutdown_rx));

        info!(path = %file_path.display(), len = last_known_len, "monitoring file for growth");

        state.active = Some(ActiveWatch {
            path: file_path,
            last_known_len,
            generation,
            _watcher: watcher,
            shutdown_tx,
            _task_handle: task_handle,
        });
        Ok(())
    }

    /// Stops monitoring. A no-op when nothing is monitored.
    ///
    /// No signal is raised after this returns.
    pub fn deactivate(&self) {
        if let Some(active) = self.lock_state().active.take() {
            stop_watch(active);
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_state().active.is_some()
    }

    /// The file currently monitored, if any.
    pub fn monitored_path(&self) -> Option<PathBuf> {
        self.lock_state().active.as_ref().map(|active| active.path.clone())
    }

    fn lock_state(&self) -> MutexGuard<'_, NotifierState> {
        lock(&self.state)
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn lock(state: &Mutex<NotifierState>) -> MutexGuard<'_, NotifierState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stop_watch(active: ActiveWatch) {
    // Dropping the watcher unregisters it; the task exits on the shutdown signal.
    let _ = active.shutdown_tx.send(());
    info!(path = %active.path.display(), "stopped monitoring file");
}

/// Registers an OS watch on the directory holding `file_path`.
fn start_watching(
    file_path: &Path,
    event_tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.send(res);
        },
        Config::default(),
    )?;

    let watch_path = match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}

/// Background task state for one activation.
struct Monitor {
    state: Arc<Mutex<NotifierState>>,
    signals: Arc<Subscribers<UpdateRequired>>,
    generation: u64,
    file_name: String,
    config: TailConfig,
}

impl Monitor {
    async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut next_poll = Instant::now() + self.config.poll_interval;
        let mut pending_signal: Option<Instant> = None;

        loop {
            let growth = tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                _ = sleep_until(pending_signal.unwrap_or(next_poll)), if pending_signal.is_some() => {
                    pending_signal = None;
                    if !self.raise_signal() {
                        break;
                    }
                    continue;
                }

                Some(event) = events.recv() => match event {
                    Ok(event) if is_event_relevant_to_file(&event, &self.file_name) => self.check_growth().await,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, file = %self.file_name, "file watcher error");
                        continue;
                    }
                },

                _ = sleep_until(next_poll) => {
                    next_poll = Instant::now() + self.config.poll_interval;
                    self.check_growth().await
                }
            };

            match growth {
                Growth::Grew(len) => {
                    debug!(file = %self.file_name, len, "file grew");
                    let now = Instant::now();
                    next_poll = now + self.config.poll_interval;
                    if pending_signal.is_none() {
                        pending_signal = Some(now + self.config.debounce);
                    }
                }
                Growth::Unchanged => {}
                Growth::Stale => break,
            }
        }
    }

    /// Re-stats the file and records any growth.
    ///
    /// The stat runs without the state lock held; the generation is checked
    /// again before the new length is recorded.
    async fn check_growth(&self) -> Growth {
        let path = match self.current_watch(|active| active.path.clone()) {
            Some(path) => path,
            None => return Growth::Stale,
        };

        let len = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file unavailable");
                return Growth::Unchanged;
            }
        };

        self.current_watch(|active| {
            if len <= active.last_known_len {
                return Growth::Unchanged;
            }
            active.last_known_len = len;
            Growth::Grew(len)
        })
        .unwrap_or(Growth::Stale)
    }

    /// Runs `f` on the active watch if it still belongs to this monitor.
    fn current_watch<T>(&self, f: impl FnOnce(&mut ActiveWatch) -> T) -> Option<T> {
        let mut state = lock(&self.state);
        match state.active.as_mut() {
            Some(active) if active.generation == self.generation => Some(f(active)),
            _ => None,
        }
    }

    /// Publishes one signal unless this watch is no longer current.
    fn raise_signal(&self) -> bool {
        let state = lock(&self.state);
        match &state.active {
            Some(active) if active.generation == self.generation => {
                self.signals.publish(UpdateRequired);
                true
            }
            _ => false,
        }
    }
}
