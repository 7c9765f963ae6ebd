// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire messages of the custody / re-encryption protocol.
//!
//! Every request a proxy acts on is signed; signing payloads are the bcs
//! encoding of the message fields, so a byte-level mismatch anywhere fails
//! the signature check. Verification helpers live on the types; *which* key
//! a message must verify against is the receiving side's decision (a proxy
//! always checks against the key recorded at arrangement time, never against
//! a key the request claims).

use crate::{
    crypto::{public_key_from_bytes, public_key_to_bytes, signature_from_bytes, CryptoError},
    ids::{PolicyId, ProxyId},
    keyring::SigningPower,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use umbral_pre::PublicKey;

const REVOCATION_DOMAIN: &[u8] = b"capsa::revocation::v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization failed: {0}")]
    Codec(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Signature check failed")]
    BadSignature,
}

impl From<bcs::Error> for ProtocolError {
    fn from(error: bcs::Error) -> Self {
        ProtocolError::Codec(error.to_string())
    }
}

/// A grantor's custody offer for one key fragment. The policy id is
/// recomputable from the embedded keys and label; proxies must reject
/// offers where it does not match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangementOffer {
    pub policy_id: PolicyId,
    #[serde(with = "serde_bytes")]
    pub grantor_verifying: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub grantee_verifying: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub grantee_decrypting: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub policy_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub label: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub fragment: Vec<u8>,
    pub expiration_unix_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedArrangementOffer {
    pub offer: ArrangementOffer,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedArrangementOffer {
    pub fn sign(offer: ArrangementOffer, signing: &SigningPower) -> Result<Self, ProtocolError> {
        let payload = bcs::to_bytes(&offer)?;
        let signature = signing.sign(&payload);
        Ok(Self {
            offer,
            signature: crate::crypto::signature_to_bytes(&signature),
        })
    }

    /// Checks the grantor signature against the verifying key embedded in
    /// the offer. The caller still has to decide whether it trusts that key.
    pub fn verify_signature(&self) -> Result<(), ProtocolError> {
        let verifying = public_key_from_bytes(&self.offer.grantor_verifying)?;
        let signature = signature_from_bytes(&self.signature)?;
        let payload = bcs::to_bytes(&self.offer)?;
        if signature.verify(&verifying, &payload) {
            Ok(())
        } else {
            Err(ProtocolError::BadSignature)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrangementRejectReason {
    BadSignature,
    PolicyIdMismatch,
    InvalidFragment,
    Expired,
    AlreadyInCustody,
    AtCapacity,
    Blacklisted,
}

impl fmt::Display for ArrangementRejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArrangementRejectReason::BadSignature => "BadSignature",
            ArrangementRejectReason::PolicyIdMismatch => "PolicyIdMismatch",
            ArrangementRejectReason::InvalidFragment => "InvalidFragment",
            ArrangementRejectReason::Expired => "Expired",
            ArrangementRejectReason::AlreadyInCustody => "AlreadyInCustody",
            ArrangementRejectReason::AtCapacity => "AtCapacity",
            ArrangementRejectReason::Blacklisted => "Blacklisted",
        };
        write!(f, "{}", name)
    }
}

/// A proxy's answer to a custody offer. Rejection is a normal outcome, not
/// an error; the grantor substitutes another candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrangementResponse {
    Accepted {
        policy_id: PolicyId,
        proxy: ProxyId,
    },
    Rejected {
        policy_id: PolicyId,
        reason: ArrangementRejectReason,
    },
}

/// A grantee's authenticated request for re-encryption of one or more
/// capsules under a single policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub policy_id: PolicyId,
    pub capsules: Vec<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub grantee_verifying: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl WorkOrder {
    pub fn sign(
        policy_id: PolicyId,
        capsules: Vec<Vec<u8>>,
        signing: &SigningPower,
    ) -> Result<Self, ProtocolError> {
        let grantee_verifying = public_key_to_bytes(&signing.verifying_key());
        let payload = Self::signing_payload(policy_id, &capsules, &grantee_verifying)?;
        let signature = signing.sign(&payload);
        Ok(Self {
            policy_id,
            capsules,
            grantee_verifying,
            signature: crate::crypto::signature_to_bytes(&signature),
        })
    }

    fn signing_payload(
        policy_id: PolicyId,
        capsules: &[Vec<u8>],
        grantee_verifying: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        Ok(bcs::to_bytes(&(policy_id, capsules, grantee_verifying))?)
    }

    /// Checks the order signature against the embedded grantee key. Binding
    /// that key to the policy is the proxy's job, using its custody record.
    pub fn verify_signature(&self) -> Result<(), ProtocolError> {
        let verifying = public_key_from_bytes(&self.grantee_verifying)?;
        let signature = signature_from_bytes(&self.signature)?;
        let payload = Self::signing_payload(self.policy_id, &self.capsules, &self.grantee_verifying)?;
        if signature.verify(&verifying, &payload) {
            Ok(())
        } else {
            Err(ProtocolError::BadSignature)
        }
    }
}

/// A proxy's signed partial results, one cfrag per requested capsule, in
/// request order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderReceipt {
    pub policy_id: PolicyId,
    pub cfrags: Vec<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub proxy_verifying: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl WorkOrderReceipt {
    pub fn sign(
        policy_id: PolicyId,
        cfrags: Vec<Vec<u8>>,
        signing: &SigningPower,
    ) -> Result<Self, ProtocolError> {
        let proxy_verifying = public_key_to_bytes(&signing.verifying_key());
        let payload = Self::signing_payload(policy_id, &cfrags, &proxy_verifying)?;
        let signature = signing.sign(&payload);
        Ok(Self {
            policy_id,
            cfrags,
            proxy_verifying,
            signature: crate::crypto::signature_to_bytes(&signature),
        })
    }

    fn signing_payload(
        policy_id: PolicyId,
        cfrags: &[Vec<u8>],
        proxy_verifying: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        Ok(bcs::to_bytes(&(policy_id, cfrags, proxy_verifying))?)
    }

    /// Verifies the receipt against the proxy key the destination map
    /// advertised, not the key the receipt claims.
    pub fn verify_signature(&self, expected: &PublicKey) -> Result<(), ProtocolError> {
        if self.proxy_verifying != public_key_to_bytes(expected) {
            return Err(ProtocolError::BadSignature);
        }
        let signature = signature_from_bytes(&self.signature)?;
        let payload = Self::signing_payload(self.policy_id, &self.cfrags, &self.proxy_verifying)?;
        if signature.verify(expected, &payload) {
            Ok(())
        } else {
            Err(ProtocolError::BadSignature)
        }
    }
}

/// Typed refusal to service a work order. Issued before any cryptographic
/// work happens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum WorkOrderRejection {
    #[error("Policy {0} not found")]
    PolicyNotFound(PolicyId),
    #[error("Policy {0} is revoked")]
    PolicyRevoked(PolicyId),
    #[error("Work order signature rejected for policy {0}")]
    InvalidSignature(PolicyId),
    #[error("Malformed work order for policy {0}")]
    Malformed(PolicyId),
}

/// What a proxy answers to a work order. A rejection is an application-level
/// reply, distinct from a transport failure.
pub type WorkOrderOutcome = Result<WorkOrderReceipt, WorkOrderRejection>;

/// Grantor-signed instruction to destroy a custody record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationOrder {
    pub policy_id: PolicyId,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl RevocationOrder {
    pub fn sign(policy_id: PolicyId, signing: &SigningPower) -> Result<Self, ProtocolError> {
        let payload = Self::signing_payload(policy_id)?;
        let signature = signing.sign(&payload);
        Ok(Self {
            policy_id,
            signature: crate::crypto::signature_to_bytes(&signature),
        })
    }

    fn signing_payload(policy_id: PolicyId) -> Result<Vec<u8>, ProtocolError> {
        Ok(bcs::to_bytes(&(REVOCATION_DOMAIN, policy_id))?)
    }

    /// Verified against the grantor key recorded at arrangement time only.
    pub fn verify_signature(&self, grantor_verifying: &PublicKey) -> Result<(), ProtocolError> {
        let signature = signature_from_bytes(&self.signature)?;
        let payload = Self::signing_payload(self.policy_id)?;
        if signature.verify(grantor_verifying, &payload) {
            Ok(())
        } else {
            Err(ProtocolError::BadSignature)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevocationOutcome {
    Revoked(PolicyId),
    AlreadyRevoked(PolicyId),
    NotFound(PolicyId),
    InvalidSignature(PolicyId),
}

impl RevocationOutcome {
    /// Whether the custodian confirmed the fragment is unusable.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            RevocationOutcome::Revoked(_) | RevocationOutcome::AlreadyRevoked(_)
        )
    }
}
