// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The destination map: the grantor-signed, grantee-encrypted directory of
//! which proxies hold fragments for a policy.
//!
//! Layering, outside in: a [`SealedDestinationMap`] is the published object,
//! encrypted for the grantee. It opens to a [`SignedDestinationMap`], which
//! holds the exact payload bytes plus the grantor signature over them; the
//! signature is checked against those bytes *before* the payload is decoded,
//! so a flipped bit anywhere yields a verification failure, never a map with
//! a subtly wrong destination. Routing entries are individually encrypted
//! for the grantee as well.

use crate::{
    crypto::{public_key_to_bytes, signature_from_bytes, signature_to_bytes, CryptoError},
    ids::{PolicyId, ProxyId},
    keyring::SigningPower,
    message_kit::{MessageKit, SealError},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use umbral_pre::{PublicKey, SecretKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("Map serialization failed: {0}")]
    Codec(String),
    #[error("Map signature check failed")]
    BadSignature,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Seal(#[from] SealError),
}

impl From<bcs::Error> for MapError {
    fn from(error: bcs::Error) -> Self {
        MapError::Codec(error.to_string())
    }
}

/// What a grantee needs to reach one custodian.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub proxy: ProxyId,
    pub endpoint: String,
    #[serde(with = "serde_bytes")]
    pub verifying_key: Vec<u8>,
}

impl RoutingEntry {
    pub fn seal_for(&self, recipient: &PublicKey) -> Result<MessageKit, MapError> {
        let bytes = bcs::to_bytes(self)?;
        Ok(MessageKit::seal(recipient, &bytes)?)
    }

    pub fn unseal(kit: &MessageKit, secret: &SecretKey) -> Result<Self, MapError> {
        let bytes = kit.unseal_original(secret)?;
        Ok(bcs::from_bytes(&bytes)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationMapPayload {
    pub policy_id: PolicyId,
    pub m: u16,
    pub n: u16,
    #[serde(with = "serde_bytes")]
    pub policy_key: Vec<u8>,
    /// Per-proxy routing info, each entry encrypted for the grantee.
    /// BTreeMap keeps the encoding deterministic.
    pub entries: BTreeMap<ProxyId, MessageKit>,
}

/// Payload bytes plus the grantor signature over exactly those bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDestinationMap {
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    #[serde(with = "serde_bytes")]
    signature: Vec<u8>,
}

impl SignedDestinationMap {
    pub fn sign(
        payload: &DestinationMapPayload,
        signing: &SigningPower,
    ) -> Result<Self, MapError> {
        let payload = bcs::to_bytes(payload)?;
        let signature = signing.sign(&payload);
        Ok(Self {
            payload,
            signature: signature_to_bytes(&signature),
        })
    }

    /// Signature check first, decode second. No entry is exposed from a map
    /// that does not verify.
    pub fn verify_and_decode(
        &self,
        grantor_verifying: &PublicKey,
    ) -> Result<DestinationMapPayload, MapError> {
        let signature = signature_from_bytes(&self.signature)?;
        if !signature.verify(grantor_verifying, &self.payload) {
            return Err(MapError::BadSignature);
        }
        Ok(bcs::from_bytes(&self.payload)?)
    }
}

/// The published form: the signed map, encrypted for the grantee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedDestinationMap(MessageKit);

impl SealedDestinationMap {
    pub fn seal(
        map: &SignedDestinationMap,
        grantee_encrypting: &PublicKey,
    ) -> Result<Self, MapError> {
        let bytes = bcs::to_bytes(map)?;
        Ok(Self(MessageKit::seal(grantee_encrypting, &bytes)?))
    }

    pub fn unseal(&self, grantee_secret: &SecretKey) -> Result<SignedDestinationMap, MapError> {
        let bytes = self.0.unseal_original(grantee_secret)?;
        Ok(bcs::from_bytes(&bytes)?)
    }

    /// Encoding used by the publication sink. Decoding rejects truncated or
    /// over-long input.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MapError> {
        Ok(bcs::to_bytes(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MapError> {
        Ok(bcs::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::Keyring;

    fn sample_payload(grantor: &Keyring, grantee_pk: &PublicKey) -> DestinationMapPayload {
        let grantor_pk = grantor.signing().unwrap().verifying_key();
        let proxy_key = Keyring::random_proxy().signing().unwrap().verifying_key();
        let proxy = ProxyId::from_verifying_key(&proxy_key);
        let entry = RoutingEntry {
            proxy,
            endpoint: "proxy-0.capsa.test:9151".to_string(),
            verifying_key: public_key_to_bytes(&proxy_key),
        };
        let mut entries = BTreeMap::new();
        entries.insert(proxy, entry.seal_for(grantee_pk).unwrap());
        DestinationMapPayload {
            policy_id: PolicyId::new(&grantor_pk, &grantor_pk, b"label"),
            m: 2,
            n: 3,
            policy_key: public_key_to_bytes(
                &grantor.delegating().unwrap().policy_encrypting_key(b"label"),
            ),
            entries,
        }
    }

    #[test]
    fn sign_seal_unseal_verify_roundtrip() {
        let grantor = Keyring::random_grantor();
        let grantee = Keyring::random_grantee();
        let grantee_pk = grantee.decrypting().unwrap().public_key();
        let payload = sample_payload(&grantor, &grantee_pk);

        let signed = SignedDestinationMap::sign(&payload, grantor.signing().unwrap()).unwrap();
        let sealed = SealedDestinationMap::seal(&signed, &grantee_pk).unwrap();
        let published = sealed.to_bytes().unwrap();

        let fetched = SealedDestinationMap::from_bytes(&published).unwrap();
        let opened = fetched
            .unseal(grantee.decrypting().unwrap().secret_key())
            .unwrap();
        let decoded = opened
            .verify_and_decode(&grantor.signing().unwrap().verifying_key())
            .unwrap();
        assert_eq!(decoded, payload);

        let entry = RoutingEntry::unseal(
            decoded.entries.values().next().unwrap(),
            grantee.decrypting().unwrap().secret_key(),
        )
        .unwrap();
        assert_eq!(entry.endpoint, "proxy-0.capsa.test:9151");
    }

    #[test]
    fn any_payload_mutation_fails_verification() {
        let grantor = Keyring::random_grantor();
        let grantee = Keyring::random_grantee();
        let grantee_pk = grantee.decrypting().unwrap().public_key();
        let payload = sample_payload(&grantor, &grantee_pk);
        let signed = SignedDestinationMap::sign(&payload, grantor.signing().unwrap()).unwrap();

        for byte_index in 0..signed.payload.len() {
            let mut tampered = signed.clone();
            tampered.payload[byte_index] ^= 0x01;
            let result =
                tampered.verify_and_decode(&grantor.signing().unwrap().verifying_key());
            assert!(result.is_err(), "mutation at byte {} went unnoticed", byte_index);
        }
    }

    #[test]
    fn verification_against_the_wrong_grantor_fails() {
        let grantor = Keyring::random_grantor();
        let grantee = Keyring::random_grantee();
        let payload = sample_payload(&grantor, &grantee.decrypting().unwrap().public_key());
        let signed = SignedDestinationMap::sign(&payload, grantor.signing().unwrap()).unwrap();
        let imposter = Keyring::random_grantor();
        assert_eq!(
            signed
                .verify_and_decode(&imposter.signing().unwrap().verifying_key())
                .err(),
            Some(MapError::BadSignature)
        );
    }

    #[test]
    fn truncated_published_bytes_are_rejected() {
        let grantor = Keyring::random_grantor();
        let grantee = Keyring::random_grantee();
        let grantee_pk = grantee.decrypting().unwrap().public_key();
        let payload = sample_payload(&grantor, &grantee_pk);
        let signed = SignedDestinationMap::sign(&payload, grantor.signing().unwrap()).unwrap();
        let sealed = SealedDestinationMap::seal(&signed, &grantee_pk).unwrap();
        let published = sealed.to_bytes().unwrap();

        assert!(SealedDestinationMap::from_bytes(&published[..published.len() - 1]).is_err());
        let mut padded = published.clone();
        padded.push(0);
        assert!(SealedDestinationMap::from_bytes(&padded).is_err());
    }
}
