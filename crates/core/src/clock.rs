//! Clock abstraction for testable time handling.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current wall-clock time, expressed as epoch milliseconds.
///
/// Every timestamp stored on `Worker`/`Task`/`LogEntry` comes from a `Clock`
/// rather than `SystemTime::now()` directly, so tests can pin latency and
/// ordering without sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Real wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Controllable clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self { now_ms: Arc::new(Mutex::new(start_ms)) }
    }

    pub fn advance_ms(&self, delta: u64) {
        *self.now_ms.lock() += delta;
    }

    pub fn set_ms(&self, value: u64) {
        *self.now_ms.lock() = value;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        *self.now_ms.lock()
    }
}
