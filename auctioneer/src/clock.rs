//! Injectable time source, so scheduler tests can assert exact
//! `WaitDuration` values without sleeping real wall-clock time.

use std::sync::Mutex;
use std::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to. Useful for asserting the exact
/// `WaitDuration` a successful auction records.
pub struct FakeClock(Mutex<Instant>);

impl FakeClock {
    pub fn new() -> Self {
        Self(Mutex::new(Instant::now()))
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut guard = self.0.lock().unwrap();
        *guard += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap()
    }
}
