// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Per-RPC budgets for the grantor's fan-outs. Overall deadlines belong to
/// the caller; wrap `grant` or `revoke` in `tokio::time::timeout` if the
/// whole operation must be bounded.
#[derive(Clone, Debug)]
pub struct GrantConfig {
    pub arrangement_rpc_timeout_ms: u64,
    pub revocation_rpc_timeout_ms: u64,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            arrangement_rpc_timeout_ms: 2_000,
            revocation_rpc_timeout_ms: 2_000,
        }
    }
}

impl GrantConfig {
    pub fn arrangement_rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.arrangement_rpc_timeout_ms)
    }

    pub fn revocation_rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.revocation_rpc_timeout_ms)
    }
}
