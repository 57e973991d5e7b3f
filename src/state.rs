//! Published current-number state.
//!
//! `SharedNumber` is the single value the producer loop publishes and HTTP
//! handlers read. It is one atomic cell, so readers can never observe a torn
//! or half-updated value. The producer is the sole writer.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Sentinel stored when no number is currently valid.
pub const NO_NUMBER: i64 = -1;

/// Concurrently readable current-number cell.
///
/// Cloning shares the underlying cell.
#[derive(Clone, Debug)]
pub struct SharedNumber {
    cell: Arc<AtomicI64>,
}

impl Default for SharedNumber {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedNumber {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(AtomicI64::new(NO_NUMBER)),
        }
    }

    /// Swap in a new value. `None` clears the number.
    pub fn set(&self, value: Option<u32>) {
        let raw = value.map(|v| v as i64).unwrap_or(NO_NUMBER);
        self.cell.store(raw, Ordering::SeqCst);
    }

    /// Most recently published value, or `None` when no number is held.
    pub fn get(&self) -> Option<u32> {
        match self.cell.load(Ordering::SeqCst) {
            NO_NUMBER => None,
            v => Some(v as u32),
        }
    }

    /// Raw value with `-1` encoding "no number", as served by the API.
    pub fn sentinel(&self) -> i64 {
        self.cell.load(Ordering::SeqCst)
    }
}
