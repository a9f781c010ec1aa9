//! Tuning knobs for change detection.

use std::time::Duration;

/// Default interval of the fallback poll that re-checks the file when OS events are missed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default window in which repeated growth collapses into a single update signal.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Configuration for tailing a file.
///
/// ```rust
/// use log_tailer::TailConfig;
/// use std::time::Duration;
///
/// let config = TailConfig::default()
///     .with_poll_interval(Duration::from_secs(1))
///     .with_debounce(Duration::from_millis(50));
/// assert!(config.watch_events);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    /// Upper bound on how stale the records can get if change events are lost.
    pub poll_interval: Duration,
    /// Growth detected within this window after the first growth raises only one signal.
    pub debounce: Duration,
    /// Subscribe to OS file-change events. When false, only the fallback poll runs.
    pub watch_events: bool,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            watch_events: true,
        }
    }
}

impl TailConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_watch_events(mut self, watch_events: bool) -> Self {
        self.watch_events = watch_events;
        self
    }
}
