//! A log file tailed into an observable sequence of records.

use crate::config::TailConfig;
use crate::error::Result;
use crate::reader::update_records;
use crate::record::Record;
use crate::sequence::AppendOnlySequence;
use crate::subscription::Subscription;
use crate::watcher::{ChangeNotifier, UpdateRequired};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One log file, the records read from it so far, and its live-update machinery.
///
/// Records only ever get appended to [`records`](Self::records), in file order.
/// [`refresh`](Self::refresh) reads whatever was appended to the file since
/// the last read; [`activate`](Self::activate) makes that happen automatically
/// whenever the file grows.
pub struct TailedFile {
    inner: Arc<Inner>,
    live: Mutex<Option<LiveUpdates>>,
}

struct Inner {
    path: PathBuf,
    /// Byte offset up to which the file has been consumed. Held across a
    /// whole update, so concurrent refreshes run one after another.
    last_read_position: AsyncMutex<u64>,
    records: AppendOnlySequence<Record>,
    notifier: ChangeNotifier,
}

struct LiveUpdates {
    shutdown_tx: broadcast::Sender<()>,
    _task_handle: JoinHandle<()>,
}

impl TailedFile {
    /// Creates a tailed file that has read nothing yet.
    pub fn new<P: AsRef<Path>>(path: P, config: TailConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.as_ref().to_path_buf(),
                last_read_position: AsyncMutex::new(0),
                records: AppendOnlySequence::new(),
                notifier: ChangeNotifier::new(config),
            }),
            live: Mutex::new(None),
        }
    }

    /// Reads every record currently in the file.
    ///
    /// Fails with [`Error::FileNotFound`](crate::Error::FileNotFound) if the file does not exist.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_config(path, TailConfig::default()).await
    }

    pub async fn load_with_config<P: AsRef<Path>>(path: P, config: TailConfig) -> Result<Self> {
        let file = Self::new(path, config);
        file.refresh().await?;
        Ok(file)
    }

    /// Reads records appended since the last read. Returns how many were added.
    ///
    /// On failure nothing is appended and the read position stays where it was.
    pub async fn refresh(&self) -> Result<usize> {
        self.inner.refresh().await
    }

    /// Starts refreshing automatically whenever the file grows. A no-op if already active.
    ///
    /// Growth that happened while inactive is picked up by the next refresh,
    /// not by activation itself. Must be called from within a Tokio runtime.
    pub fn activate(&self) -> Result<()> {
        let mut live = self.lock_live();
        if live.is_some() {
            return Ok(());
        }

        let signals = self.inner.notifier.subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task_handle = tokio::spawn(live_update_task(
            Arc::downgrade(&self.inner),
            signals,
            shutdown_rx,
        ));

        if let Err(e) = self.inner.notifier.activate(&self.inner.path) {
            let _ = shutdown_tx.send(());
            return Err(e);
        }

        *live = Some(LiveUpdates {
            shutdown_tx,
            _task_handle: task_handle,
        });
        Ok(())
    }

    /// Stops automatic refreshing. Records and read position are kept.
    ///
    /// A refresh already in progress runs to completion.
    pub fn deactivate(&self) {
        if let Some(live) = self.lock_live().take() {
            self.inner.notifier.deactivate();
            let _ = live.shutdown_tx.send(());
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_live().is_some()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Records read so far. Subscribe to it to hear about new ones.
    pub fn records(&self) -> &AppendOnlySequence<Record> {
        &self.inner.records
    }

    /// Byte offset up to which the file has been consumed.
    ///
    /// Waits for a refresh in progress to finish.
    pub async fn last_read_position(&self) -> u64 {
        *self.inner.last_read_position.lock().await
    }

    fn lock_live(&self) -> std::sync::MutexGuard<'_, Option<LiveUpdates>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TailedFile {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl Inner {
    async fn refresh(&self) -> Result<usize> {
        let mut position = self.last_read_position.lock().await;
        update_records(&self.path, &mut position, &self.records).await
    }
}

/// Refreshes the file once per update signal until shut down.
///
/// Holds the file weakly so a dropped [`TailedFile`] is not kept alive by its own task.
async fn live_update_task(
    inner: Weak<Inner>,
    mut signals: Subscription<UpdateRequired>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            signal = signals.recv() => {
                if signal.is_none() {
                    break;
                }
            }
        }

        let Some(file) = inner.upgrade() else {
            break;
        };
        match file.refresh().await {
            Ok(count) => debug!(path = %file.path.display(), count, "live refresh"),
            Err(e) => warn!(path = %file.path.display(), error = %e, "live refresh failed"),
        }
    }
}
