// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use capsa_types::sync::Mutex;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Bounded ledger of work orders refused for identity reasons, keyed by the
/// verifying key the order claimed. Audit-only; recording never changes how
/// the current request is answered beyond the refusal itself.
pub struct SuspicionLedger {
    counters: Mutex<LruCache<Vec<u8>, u64>>,
}

impl SuspicionLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            counters: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn record(&self, claimed_verifying_key: &[u8]) {
        let mut counters = self.counters.lock();
        match counters.get_mut(claimed_verifying_key) {
            Some(count) => *count += 1,
            None => {
                counters.put(claimed_verifying_key.to_vec(), 1);
            },
        }
    }

    /// Current counters, most recently touched first.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, u64)> {
        self.counters
            .lock()
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect()
    }
}
