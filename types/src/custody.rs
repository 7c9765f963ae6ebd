// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Proxy-local custody state for one policy.

use crate::ids::PolicyId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyState {
    Active,
    Revoked,
}

/// One record per (policy, proxy), created when an arrangement offer is
/// accepted. Mutated only by revocation; removed by the expiry sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub policy_id: PolicyId,
    /// Key fragment bytes. Cleared on revocation so the fragment is
    /// unusable even while the row remains for audit.
    #[serde(with = "serde_bytes")]
    pub fragment: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub policy_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub grantor_verifying: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub grantee_verifying: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub grantee_decrypting: Vec<u8>,
    pub expiration_unix_secs: u64,
    pub state: CustodyState,
}

impl CustodyRecord {
    pub fn is_expired(&self, now_unix_secs: u64) -> bool {
        now_unix_secs >= self.expiration_unix_secs
    }

    pub fn is_serviceable(&self, now_unix_secs: u64) -> bool {
        self.state == CustodyState::Active && !self.is_expired(now_unix_secs)
    }

    /// Revocation keeps the row but destroys the fragment.
    pub fn revoke(&mut self) {
        self.state = CustodyState::Revoked;
        self.fragment.clear();
    }
}
