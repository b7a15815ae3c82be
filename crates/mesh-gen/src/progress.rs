//! Progress reporting and cancellation for long-running operations.
//!
//! Two long-running stages exist in mesh generation: the external engine run
//! and the Lloyd relaxation. The engine reports through
//! [`EngineEvent`](crate::engine::EngineEvent)s; relaxation reports through a
//! [`ProgressCallback`] which may also cancel it. Both honour a shared
//! [`CancellationToken`].
//!
//! # Example
//!
//! ```
//! use mesh_gen::progress::{Progress, ProgressCallback};
//!
//! let callback: ProgressCallback = Box::new(|progress: &Progress| {
//!     println!("{}% complete: {}", progress.percent(), progress.message);
//!     true // Continue processing (return false to cancel)
//! });
//! # let _ = callback;
//! ```

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current step (0-based).
    pub current: u64,

    /// Total number of steps.
    pub total: u64,

    /// Human-readable message describing current operation.
    pub message: String,

    /// Elapsed time since operation started.
    pub elapsed: Duration,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    /// Get progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    /// Check if the operation is complete.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Callback function for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// A clonable flag that asks a running operation to stop.
///
/// Clones share state, so a token handed to a pipeline can be triggered from
/// another thread (a signal handler, a UI button, a watchdog).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Step counter that throttles callback invocations.
#[derive(Debug)]
pub struct ProgressTracker {
    current: Cell<u64>,
    total: u64,
    cancelled: Cell<bool>,
    start_time: Instant,
    last_callback_time: Cell<Option<Instant>>,
    callback_interval: Duration,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total: u64) -> Self {
        Self::with_interval(total, Duration::from_millis(100))
    }

    /// Create a tracker with custom callback interval.
    pub fn with_interval(total: u64, interval: Duration) -> Self {
        Self {
            current: Cell::new(0),
            total,
            cancelled: Cell::new(false),
            start_time: Instant::now(),
            last_callback_time: Cell::new(None),
            callback_interval: interval,
        }
    }

    /// Set the current progress value.
    #[inline]
    pub fn set(&self, value: u64) {
        self.current.set(value);
    }

    /// Get the current progress value.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.get()
    }

    /// Get the total count.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Check if a callback requested cancellation.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Create a Progress snapshot.
    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total,
            message: message.into(),
            elapsed: self.start_time.elapsed(),
        }
    }

    /// Call the callback if enough time has passed since last call.
    ///
    /// The first and the final step always reach the callback.
    /// Returns `false` if the callback requested cancellation.
    pub fn maybe_callback(
        &self,
        callback: Option<&ProgressCallback>,
        message: impl Into<String>,
    ) -> bool {
        if self.is_cancelled() {
            return false;
        }

        let Some(callback) = callback else {
            return true;
        };

        let now = Instant::now();
        let due = match self.last_callback_time.get() {
            None => true,
            Some(last) => {
                now.duration_since(last) >= self.callback_interval
                    || self.current() >= self.total
            }
        };
        if !due {
            return true;
        }
        self.last_callback_time.set(Some(now));

        let should_continue = callback(&self.snapshot(message));
        if !should_continue {
            self.cancelled.set(true);
        }
        should_continue
    }
}
