// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

/// Local admission policy. Rejections under this policy are ordinary
/// protocol responses; the grantor substitutes another candidate.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Maximum number of custody records held at once.
    pub max_custody_records: usize,
    /// Grantor verifying keys (canonical bytes) this proxy refuses offers
    /// from.
    pub blacklisted_grantors: HashSet<Vec<u8>>,
    /// Bound on the suspicion ledger; oldest entries are evicted first.
    pub suspicion_capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_custody_records: 10_000,
            blacklisted_grantors: HashSet::new(),
            suspicion_capacity: 1024,
        }
    }
}
