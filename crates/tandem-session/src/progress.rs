//! Cooperative cancellation and progress reporting for long negotiations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Passed into `run`/`accept` by the negotiation handler. A negotiation
/// polls `is_cancelled` while it waits and cancels itself when it turns true.
pub trait ProgressMonitor: Send + Sync {
    fn is_cancelled(&self) -> bool;

    fn begin(&self, _task: &str, _total: u64) {}

    fn worked(&self, _units: u64) {}

    fn done(&self) {}
}

/// Never cancelled, reports nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressMonitor;

impl ProgressMonitor for NullProgressMonitor {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Monitor backed by a `CancellationToken` that also counts work units.
#[derive(Debug, Default)]
pub struct TokenProgressMonitor {
    token: CancellationToken,
    total: AtomicU64,
    worked: AtomicU64,
    done: AtomicBool,
}

impl TokenProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn worked_units(&self) -> u64 {
        self.worked.load(Ordering::Relaxed)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }
}

impl ProgressMonitor for TokenProgressMonitor {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn begin(&self, _task: &str, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn worked(&self, units: u64) {
        self.worked.fetch_add(units, Ordering::Relaxed);
    }

    fn done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }
}
