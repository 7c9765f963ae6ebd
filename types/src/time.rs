// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! A minimal clock abstraction so expiry checks are testable without
//! sleeping. Mirrors the real/mock split of the service clocks used by the
//! engines: production code holds a [`Clock`], tests hold the [`ManualClock`]
//! handle and advance it explicitly.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug)]
pub enum Clock {
    System,
    Manual(Arc<AtomicU64>),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    /// A clock that only moves when the returned handle is advanced.
    pub fn manual(start_unix_secs: u64) -> (Self, ManualClock) {
        let shared = Arc::new(AtomicU64::new(start_unix_secs));
        (Clock::Manual(shared.clone()), ManualClock { shared })
    }

    pub fn now_unix_secs(&self) -> u64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            Clock::Manual(shared) => shared.load(Ordering::SeqCst),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ManualClock {
    shared: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn advance_secs(&self, secs: u64) {
        self.shared.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, unix_secs: u64) {
        self.shared.store(unix_secs, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let (clock, handle) = Clock::manual(100);
        assert_eq!(clock.now_unix_secs(), 100);
        handle.advance_secs(50);
        assert_eq!(clock.now_unix_secs(), 150);
        handle.set(10);
        assert_eq!(clock.now_unix_secs(), 10);
    }
}
