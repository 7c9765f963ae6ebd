// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub rpc_timeout_ms: u64,
    /// Extra proxies contacted beyond the threshold on the first wave, to
    /// hide the slowest responders. Substitution still covers the rest.
    pub overselection: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 2_000,
            overselection: 1,
        }
    }
}

impl RetrievalConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
