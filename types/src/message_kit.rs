// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The encryptor surface: anyone holding a policy encrypting key can seal a
//! payload for it without ever talking to the grantor.

use crate::crypto::{capsule_from_bytes, capsule_to_bytes, CryptoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use umbral_pre::{decrypt_original, encrypt, Capsule, PublicKey, SecretKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error(transparent)]
    Malformed(#[from] CryptoError),
}

/// A capsule plus the symmetric ciphertext keyed by it. The capsule is
/// activatable later by combining enough partial re-encryptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKit {
    #[serde(with = "serde_bytes")]
    capsule: Vec<u8>,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

impl MessageKit {
    pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Self, SealError> {
        let (capsule, ciphertext) =
            encrypt(recipient, plaintext).map_err(|e| SealError::Encryption(format!("{:?}", e)))?;
        Ok(Self {
            capsule: capsule_to_bytes(&capsule),
            ciphertext: ciphertext.into_vec(),
        })
    }

    /// Opens the kit with the secret key matching the key it was sealed for.
    /// Only useful to the original recipient; delegated readers go through
    /// the retrieval engine instead.
    pub fn unseal_original(&self, secret: &SecretKey) -> Result<Vec<u8>, SealError> {
        let capsule = self.capsule()?;
        decrypt_original(secret, &capsule, &self.ciphertext)
            .map(|plaintext| plaintext.into_vec())
            .map_err(|e| SealError::Decryption(format!("{:?}", e)))
    }

    pub fn capsule(&self) -> Result<Capsule, CryptoError> {
        capsule_from_bytes(&self.capsule)
    }

    pub fn capsule_bytes(&self) -> &[u8] {
        &self.capsule
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_unseal() {
        let secret = SecretKey::random();
        let kit = MessageKit::seal(&secret.public_key(), b"peace at dawn").unwrap();
        assert_eq!(kit.unseal_original(&secret).unwrap(), b"peace at dawn");
    }

    #[test]
    fn unseal_with_wrong_key_fails() {
        let kit = MessageKit::seal(&SecretKey::random().public_key(), b"payload").unwrap();
        assert!(matches!(
            kit.unseal_original(&SecretKey::random()),
            Err(SealError::Decryption(_))
        ));
    }
}
