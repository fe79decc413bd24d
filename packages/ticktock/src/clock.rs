//! Time source abstraction so the wheel's placement arithmetic can be
//! exercised deterministically in tests, without wall-clock sleeps.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A source of "now". Production code uses [`SystemClock`]; tests use
/// [`ManualClock`] and advance it explicitly.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is set explicitly by the test driving it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock().expect("clock mutex poisoned");
        *guard += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut guard = self.inner.lock().expect("clock mutex poisoned");
        *guard = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("clock mutex poisoned")
    }
}
