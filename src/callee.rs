//! Immutable compiled-function records and tier-up bookkeeping.

use crate::module::{CodePtr, Tier};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// An immutable record of one compiled function.
///
/// Created in bulk when a compilation task succeeds and installed into the
/// owning [`CodeBlock`](crate::CodeBlock). Never mutated afterwards, so once
/// a block is observed to be finished a `Callee` is readable from any thread
/// without locking. A recompilation at a higher tier produces new records
/// rather than touching these.
pub struct Callee {
    index: u32,
    tier: Tier,
    entrypoint: CodePtr,
}

impl Callee {
    pub(crate) fn new(index: u32, tier: Tier, entrypoint: CodePtr) -> Callee {
        Callee {
            index,
            tier,
            entrypoint,
        }
    }

    /// The machine-code entry address of this function.
    pub fn entrypoint(&self) -> CodePtr {
        self.entrypoint
    }

    /// The tier this function was compiled at.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// The function index this record belongs to.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callee")
            .field("index", &self.index)
            .field("tier", &self.tier)
            .field("entrypoint", &self.entrypoint)
            .finish()
    }
}

/// A per-function execution counter used to decide when a function is hot
/// enough to deserve recompilation at a higher tier.
///
/// Generated code bumps the counter; the embedder polls
/// [`has_crossed_threshold`](TierUpCounter::has_crossed_threshold) (or the
/// return value of [`bump`](TierUpCounter::bump)) and requests the
/// recompilation itself. The act of recompiling is outside this crate.
#[derive(Debug)]
pub struct TierUpCounter {
    count: AtomicU32,
    threshold: u32,
}

impl TierUpCounter {
    /// Creates a counter that reports crossing once `threshold` executions
    /// have been recorded.
    pub fn new(threshold: u32) -> TierUpCounter {
        TierUpCounter {
            count: AtomicU32::new(0),
            threshold,
        }
    }

    /// Records `by` executions. Returns `true` exactly when this bump moved
    /// the count across the threshold.
    pub fn bump(&self, by: u32) -> bool {
        let prev = self.count.fetch_add(by, Ordering::Relaxed);
        prev < self.threshold && prev.saturating_add(by) >= self.threshold
    }

    /// The number of executions recorded so far.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether the count has reached the threshold.
    pub fn has_crossed_threshold(&self) -> bool {
        self.count() >= self.threshold
    }
}
