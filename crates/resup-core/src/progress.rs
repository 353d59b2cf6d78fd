//! Progress figures for one transfer (percent, rate, ETA).
//!
//! Rate only counts bytes acknowledged since the transfer was last admitted,
//! so a resumed upload does not report the already-sent prefix as speed.

use std::time::Instant;

/// Snapshot of upload progress for one transfer.
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes acknowledged by the server.
    pub offset: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Bytes acknowledged since the current run started.
    pub bytes_this_run: u64,
    /// Seconds since the current run started.
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Upload rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_this_run as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0 and bytes remain).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.offset);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Percent of bytes acknowledged, in [0.0, 100.0]. An empty file has
    /// no bytes to acknowledge and stays at 0 until its transfer completes.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.offset as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

/// Start point of the current run: where the offset stood and when.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunClock {
    started: Instant,
    start_offset: u64,
}

impl RunClock {
    pub(crate) fn start(offset: u64) -> Self {
        Self {
            started: Instant::now(),
            start_offset: offset,
        }
    }

    pub(crate) fn stats(&self, offset: u64, total_bytes: u64) -> ProgressStats {
        ProgressStats {
            offset,
            total_bytes,
            bytes_this_run: offset.saturating_sub(self.start_offset),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}
