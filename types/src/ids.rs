// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Policy and proxy identifiers.
//!
//! A [`PolicyId`] is the HRAC: a collision-resistant handle over
//! (grantor verifying key, grantee verifying key, label). Proxies recompute
//! it from the offer contents, so nobody can squat on a foreign policy id.
//! A [`ProxyId`] is the fingerprint of a proxy's verifying key.

use crate::crypto::public_key_to_bytes;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use umbral_pre::PublicKey;

const ID_LENGTH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId([u8; ID_LENGTH]);

impl PolicyId {
    /// Hierarchical resource access code: truncated
    /// `Sha3-256(grantor_verifying ‖ grantee_verifying ‖ label)`.
    pub fn new(grantor_verifying: &PublicKey, grantee_verifying: &PublicKey, label: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(public_key_to_bytes(grantor_verifying));
        hasher.update(public_key_to_bytes(grantee_verifying));
        hasher.update(label);
        Self(truncate(hasher.finalize().as_slice()))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyId([u8; ID_LENGTH]);

impl ProxyId {
    pub fn from_verifying_key(verifying_key: &PublicKey) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(public_key_to_bytes(verifying_key));
        Self(truncate(hasher.finalize().as_slice()))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

fn truncate(digest: &[u8]) -> [u8; ID_LENGTH] {
    let mut out = [0u8; ID_LENGTH];
    out.copy_from_slice(&digest[..ID_LENGTH]);
    out
}
