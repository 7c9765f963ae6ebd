// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Seam between wire bytes and the external `umbral-pre` primitive.
//!
//! Umbral objects cross the network as their canonical serialization and are
//! parsed exactly once, here. Malformed input surfaces as a typed
//! [`CryptoError`] before any cryptographic work happens.

use thiserror::Error;
use umbral_pre::{
    Capsule, CapsuleFrag, DeserializableFromArray, KeyFrag, PublicKey, SerializableToArray,
    Signature, VerifiedCapsuleFrag, VerifiedKeyFrag,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Malformed {0}")]
    Malformed(&'static str),
    #[error("Invalid {0} proof")]
    InvalidProof(&'static str),
}

pub fn public_key_to_bytes(pk: &PublicKey) -> Vec<u8> {
    pk.to_array().as_slice().to_vec()
}

pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    PublicKey::from_bytes(bytes).map_err(|_| CryptoError::Malformed("public key"))
}

pub fn signature_to_bytes(signature: &Signature) -> Vec<u8> {
    signature.to_array().as_slice().to_vec()
}

pub fn signature_from_bytes(bytes: &[u8]) -> Result<Signature, CryptoError> {
    Signature::from_bytes(bytes).map_err(|_| CryptoError::Malformed("signature"))
}

pub fn capsule_to_bytes(capsule: &Capsule) -> Vec<u8> {
    capsule.to_array().as_slice().to_vec()
}

pub fn capsule_from_bytes(bytes: &[u8]) -> Result<Capsule, CryptoError> {
    Capsule::from_bytes(bytes).map_err(|_| CryptoError::Malformed("capsule"))
}

pub fn kfrag_to_bytes(kfrag: &VerifiedKeyFrag) -> Vec<u8> {
    kfrag.clone().unverify().to_array().as_slice().to_vec()
}

/// Parses and re-verifies a key fragment against the keys it was issued
/// under. Fragments are only ever used verified.
pub fn kfrag_from_bytes(
    bytes: &[u8],
    verifying_pk: &PublicKey,
    delegating_pk: &PublicKey,
    receiving_pk: &PublicKey,
) -> Result<VerifiedKeyFrag, CryptoError> {
    let kfrag = KeyFrag::from_bytes(bytes).map_err(|_| CryptoError::Malformed("key fragment"))?;
    kfrag
        .verify(verifying_pk, Some(delegating_pk), Some(receiving_pk))
        .map_err(|_| CryptoError::InvalidProof("key fragment"))
}

pub fn cfrag_to_bytes(cfrag: &VerifiedCapsuleFrag) -> Vec<u8> {
    cfrag.to_array().as_slice().to_vec()
}

/// Parses a capsule fragment and checks its correctness proof. This is the
/// grantee's admission check before a partial result counts toward the
/// threshold.
pub fn cfrag_from_bytes(
    bytes: &[u8],
    capsule: &Capsule,
    verifying_pk: &PublicKey,
    delegating_pk: &PublicKey,
    receiving_pk: &PublicKey,
) -> Result<VerifiedCapsuleFrag, CryptoError> {
    let cfrag =
        CapsuleFrag::from_bytes(bytes).map_err(|_| CryptoError::Malformed("capsule fragment"))?;
    cfrag
        .verify(capsule, verifying_pk, delegating_pk, receiving_pk)
        .map_err(|_| CryptoError::InvalidProof("capsule fragment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbral_pre::{encrypt, generate_kfrags, reencrypt, SecretKey, Signer};

    #[test]
    fn public_key_roundtrip() {
        let pk = SecretKey::random().public_key();
        let bytes = public_key_to_bytes(&pk);
        assert_eq!(public_key_from_bytes(&bytes).unwrap(), pk);
        assert_eq!(
            public_key_from_bytes(&bytes[1..]),
            Err(CryptoError::Malformed("public key"))
        );
    }

    #[test]
    fn kfrag_reverification_binds_keys() {
        let delegating_sk = SecretKey::random();
        let receiving_pk = SecretKey::random().public_key();
        let signer = Signer::new(SecretKey::random());
        let verifying_pk = signer.verifying_key();
        let kfrags = generate_kfrags(&delegating_sk, &receiving_pk, &signer, 1, 1, true, true);

        let bytes = kfrag_to_bytes(&kfrags[0]);
        assert!(kfrag_from_bytes(
            &bytes,
            &verifying_pk,
            &delegating_sk.public_key(),
            &receiving_pk
        )
        .is_ok());

        // A fragment re-verified under the wrong receiving key must fail.
        let other_pk = SecretKey::random().public_key();
        assert_eq!(
            kfrag_from_bytes(&bytes, &verifying_pk, &delegating_sk.public_key(), &other_pk),
            Err(CryptoError::InvalidProof("key fragment"))
        );
    }

    #[test]
    fn cfrag_proof_checked() {
        let delegating_sk = SecretKey::random();
        let delegating_pk = delegating_sk.public_key();
        let receiving_pk = SecretKey::random().public_key();
        let signer = Signer::new(SecretKey::random());
        let verifying_pk = signer.verifying_key();
        let (capsule, _ciphertext) = encrypt(&delegating_pk, b"payload").unwrap();
        let kfrags = generate_kfrags(&delegating_sk, &receiving_pk, &signer, 1, 1, true, true);
        let cfrag = reencrypt(&capsule, kfrags[0].clone());

        let bytes = cfrag_to_bytes(&cfrag);
        assert!(cfrag_from_bytes(
            &bytes,
            &capsule,
            &verifying_pk,
            &delegating_pk,
            &receiving_pk
        )
        .is_ok());

        // Verifying against a different capsule must reject the proof.
        let (other_capsule, _) = encrypt(&delegating_pk, b"other").unwrap();
        assert_eq!(
            cfrag_from_bytes(
                &bytes,
                &other_capsule,
                &verifying_pk,
                &delegating_pk,
                &receiving_pk
            ),
            Err(CryptoError::InvalidProof("capsule fragment"))
        );
    }
}
