//! # Stopping predicate
//!
//! Decides whether a unit worker may begin another iteration. A unit is
//! bounded by wall time (`seconds`), by iteration count (`times`), or both;
//! `{0, 0}` permits unbounded execution and the caller must bound it
//! externally.
//!
//! All `parallel` workers of a unit share one `Stop` instance, so `next()`
//! must hold a strict upper bound under contention: when `times > 0`, the
//! number of `true` returns never exceeds `times`. The counter is a single
//! shared atomic; the wall-time check is a lock-free clock read. The counter
//! advances on every `next()` call, including calls rejected by the time
//! bound, so observed iteration counts stay comparable across reruns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::OnceCell;

/// Shared gate bounding a unit's iteration loop.
#[derive(Debug)]
pub struct Stop {
    seconds: u64,
    times: u64,
    started: OnceCell<Instant>,
    count: AtomicU64,
}

impl Stop {
    pub fn new(seconds: u64, times: u64) -> Self {
        Self {
            seconds,
            times,
            started: OnceCell::new(),
            count: AtomicU64::new(0),
        }
    }

    /// Latches the start instant. Idempotent; only the first call wins.
    pub fn start(&self) {
        self.started.get_or_init(Instant::now);
    }

    /// Returns `true` if the caller may run one more iteration, consuming
    /// one admission slot. Self-starts if `start` was never called.
    pub fn next(&self) -> bool {
        let t0 = self.started.get_or_init(Instant::now);
        let prior = self.count.fetch_add(1, Ordering::Relaxed);
        if self.seconds > 0 && t0.elapsed().as_secs_f64() > self.seconds as f64 {
            return false;
        }
        if self.times > 0 && prior >= self.times {
            return false;
        }
        true
    }

    /// Non-consuming read used by drains to know whether more items may
    /// still be produced.
    pub fn is_running(&self) -> bool {
        let t0 = match self.started.get() {
            Some(t0) => t0,
            None => return true,
        };
        if self.seconds > 0 && t0.elapsed().as_secs_f64() > self.seconds as f64 {
            return false;
        }
        if self.times > 0 && self.count.load(Ordering::Relaxed) >= self.times {
            return false;
        }
        true
    }

    /// Total number of `next` calls so far, passing or not.
    pub fn iterations(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
