//! Reading buffer and stability engine.
//!
//! The engine turns a noisy per-frame blob count into a debounced current
//! number:
//!
//! - Readings are sampled once every [`SAMPLE_INTERVAL_FRAMES`] processed
//!   frames and pushed into a fixed-capacity ring buffer.
//! - A number is confirmed only after [`STABLE_RUN`] consecutive equal
//!   non-zero readings (hysteresis against single-frame flicker).
//! - A confirmed number expires once no qualifying sample has arrived for
//!   longer than [`EXPIRY`].
//!
//! The engine owns its buffer and state; it is constructed once in the
//! daemon and mutated only inside the sampling tick. Publishing is
//! dirty-flag driven: sinks see each decided value exactly once, and a
//! failed publish keeps the flag set so the next tick retries.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::state::SharedNumber;

/// Sample one reading every this many successfully processed frames.
pub const SAMPLE_INTERVAL_FRAMES: u64 = 10;

/// Consecutive equal non-zero readings required to confirm a number.
pub const STABLE_RUN: usize = 3;

/// Reading buffer capacity.
pub const READING_CAPACITY: usize = 10;

/// A confirmed number expires after this long without a qualifying sample.
pub const EXPIRY: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// ReadingBuffer
// ----------------------------------------------------------------------------

/// Sliding window of the most recent blob-count readings.
///
/// Pure data structure: ring semantics, oldest evicted first, no decision
/// logic.
pub struct ReadingBuffer {
    readings: VecDeque<u32>,
    capacity: usize,
}

impl ReadingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest when at capacity.
    pub fn push(&mut self, reading: u32) {
        while self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// The `k` most recent readings in arrival order (fewer if history is
    /// short).
    pub fn last_k(&self, k: usize) -> Vec<u32> {
        let skip = self.readings.len().saturating_sub(k);
        self.readings.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Publish sinks
// ----------------------------------------------------------------------------

/// Side-effecting destination for decided values.
///
/// `publish` receives the full new value, including the explicit "no value".
pub trait NumberSink {
    fn publish(&mut self, value: Option<u32>) -> Result<()>;
}

/// Updates the in-process atomic cell read by HTTP handlers.
pub struct SharedStateSink {
    shared: SharedNumber,
}

impl SharedStateSink {
    pub fn new(shared: SharedNumber) -> Self {
        Self { shared }
    }
}

impl NumberSink for SharedStateSink {
    fn publish(&mut self, value: Option<u32>) -> Result<()> {
        self.shared.set(value);
        Ok(())
    }
}

/// Mirrors the current number to a plain-text file for out-of-process
/// readers. The file holds the decimal string while a number is held and is
/// deleted when none is.
pub struct FileMirrorSink {
    path: PathBuf,
}

impl FileMirrorSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl NumberSink for FileMirrorSink {
    fn publish(&mut self, value: Option<u32>) -> Result<()> {
        match value {
            Some(number) => std::fs::write(&self.path, number.to_string())
                .with_context(|| format!("write number file {}", self.path.display())),
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err).with_context(|| {
                    format!("remove number file {}", self.path.display())
                }),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// StabilityEngine
// ----------------------------------------------------------------------------

/// Debouncing state machine: `NO_NUMBER` ⇄ `NUMBER(n)`.
pub struct StabilityEngine {
    readings: ReadingBuffer,
    current: Option<u32>,
    last_detected_at: Option<Instant>,
    dirty: bool,
}

impl StabilityEngine {
    pub fn new() -> Self {
        Self {
            readings: ReadingBuffer::new(READING_CAPACITY),
            current: None,
            last_detected_at: None,
            dirty: false,
        }
    }

    /// Currently decided number, `None` while in `NO_NUMBER`.
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// True when a decided value is awaiting publish.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consume one sampled reading.
    ///
    /// `now` is injected so tests can drive a simulated clock.
    pub fn observe(&mut self, reading: u32, now: Instant) {
        self.readings.push(reading);

        let tail = self.readings.last_k(STABLE_RUN);
        let stable =
            tail.len() == STABLE_RUN && tail.iter().all(|&r| r == tail[0]) && tail[0] != 0;

        if stable {
            let candidate = tail[0];
            if self.current != Some(candidate) {
                self.current = Some(candidate);
                self.dirty = true;
                log::info!("number stabilized: {}", candidate);
            }
            self.last_detected_at = Some(now);
        } else if let Some(last) = self.last_detected_at {
            // Mixed readings or a run of zeros: only expiry can change state.
            if now.duration_since(last) > EXPIRY && self.current.is_some() {
                self.current = None;
                self.last_detected_at = None;
                self.dirty = true;
                log::info!(
                    "no stable reading for {}s, number expired",
                    EXPIRY.as_secs()
                );
            }
        }
    }

    /// Push the decided value to every sink if it changed since the last
    /// successful publish. Returns `Ok(true)` when a publish happened.
    ///
    /// On error the dirty flag is retained so the next tick retries; sinks
    /// must therefore tolerate receiving the same value again.
    pub fn publish(&mut self, sinks: &mut [Box<dyn NumberSink>]) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        for sink in sinks.iter_mut() {
            sink.publish(self.current)?;
        }
        self.dirty = false;
        Ok(true)
    }
}

impl Default for StabilityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
