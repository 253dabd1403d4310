//! Live scan statistics and the shared stop flag

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Thread-safe scan statistics.
///
/// One instance is shared by the coordinator and every worker. Besides the
/// aggregate key counter it carries the cancellation flag each worker
/// polls at the top of its loop; any holder may call [`ScanStats::stop`].
#[derive(Debug)]
pub struct ScanStats {
    /// Total keys tested across workers
    keys_tested: AtomicU64,
    /// Set when the scan starts
    started: OnceLock<Instant>,
    /// Cleared to cancel every worker
    running: AtomicBool,
    /// Whether a match was found
    found: AtomicBool,
}

impl ScanStats {
    /// Create new stats
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start the clock. Later calls keep the first instant.
    pub fn start(&self) {
        let _ = self.started.set(Instant::now());
    }

    /// Increment keys tested by amount
    pub fn add_keys(&self, count: u64) {
        self.keys_tested.fetch_add(count, Ordering::Relaxed);
    }

    /// Get total keys tested
    pub fn total_keys(&self) -> u64 {
        self.keys_tested.load(Ordering::Relaxed)
    }

    /// Time since [`ScanStats::start`], zero before it
    pub fn elapsed(&self) -> Duration {
        self.started
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    /// Average keys per second since start
    pub fn keys_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_keys() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cancel the scan
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Mark as found and cancel the remaining workers
    pub fn mark_found(&self) {
        self.found.store(true, Ordering::Release);
        self.stop();
    }

    /// Check if found
    pub fn is_found(&self) -> bool {
        self.found.load(Ordering::Acquire)
    }

    /// Status line for terminals
    pub fn format(&self) -> String {
        format!(
            "[{}][Total {}][Elapsed {}]",
            format_rate(self.keys_per_second()),
            format_keys(self.total_keys()),
            format_duration(self.elapsed().as_secs_f64())
        )
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self {
            keys_tested: AtomicU64::new(0),
            started: OnceLock::new(),
            running: AtomicBool::new(true),
            found: AtomicBool::new(false),
        }
    }
}

/// Cloneable handle that cancels a scan from any thread.
#[derive(Debug, Clone)]
pub struct CancelToken {
    stats: Arc<ScanStats>,
}

impl CancelToken {
    pub(crate) fn new(stats: Arc<ScanStats>) -> Self {
        Self { stats }
    }

    /// Ask every worker to stop at its next iteration
    pub fn cancel(&self) {
        self.stats.stop();
    }

    pub fn is_cancelled(&self) -> bool {
        !self.stats.is_running()
    }
}

/// Human readable rate
pub fn format_rate(keys_per_second: f64) -> String {
    if keys_per_second >= 1_000_000.0 {
        format!("{:.2} Mkey/s", keys_per_second / 1_000_000.0)
    } else if keys_per_second >= 1000.0 {
        format!("{:.2} Kkey/s", keys_per_second / 1000.0)
    } else {
        format!("{:.0} key/s", keys_per_second)
    }
}

/// Human readable key count
pub fn format_keys(keys: u64) -> String {
    if keys >= 1_000_000_000_000 {
        format!("{:.2}T", keys as f64 / 1e12)
    } else if keys >= 1_000_000_000 {
        format!("{:.2}G", keys as f64 / 1e9)
    } else if keys >= 1_000_000 {
        format!("{:.2}M", keys as f64 / 1e6)
    } else if keys >= 1000 {
        format!("{:.2}K", keys as f64 / 1e3)
    } else {
        format!("{}", keys)
    }
}

/// Human readable duration
pub fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.0}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.0}m", seconds / 60.0)
    } else if seconds < 86400.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else {
        format!("{:.1}d", seconds / 86400.0)
    }
}
