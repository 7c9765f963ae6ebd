// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Actor key material, composed as a closed set of capabilities.
//!
//! Every actor holds a [`Keyring`] with an optional power per capability:
//! signing (authenticating protocol messages), decrypting (receiving
//! encrypted payloads) and delegating (deriving per-label policy keys).
//! A grantor carries signing + delegating, a grantee signing + decrypting,
//! a proxy signing. Asking for an absent power is a typed error, not a
//! runtime attribute lookup.

use thiserror::Error;
use umbral_pre::{PublicKey, SecretKey, SecretKeyFactory, Signature, Signer};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Keyring has no {0} capability")]
pub struct MissingCapability(pub &'static str);

/// Signs protocol payloads and exposes the matching verifying key.
pub struct SigningPower {
    signer: Signer,
}

impl SigningPower {
    pub fn new(secret: SecretKey) -> Self {
        Self {
            signer: Signer::new(secret),
        }
    }

    pub fn random() -> Self {
        Self::new(SecretKey::random())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signer.sign(message)
    }

    /// The raw signer, for fragment generation.
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn verifying_key(&self) -> PublicKey {
        self.signer.verifying_key()
    }
}

/// Holds the secret half of an encryption key pair.
pub struct DecryptingPower {
    secret: SecretKey,
}

impl DecryptingPower {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn random() -> Self {
        Self::new(SecretKey::random())
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

/// Derives per-label delegating keys. Two calls with the same label always
/// yield the same key, which is what lets an encryptor obtain the policy
/// encrypting key without talking to the grantor per message.
pub struct DelegatingPower {
    factory: SecretKeyFactory,
}

impl DelegatingPower {
    pub fn new(factory: SecretKeyFactory) -> Self {
        Self { factory }
    }

    pub fn random() -> Self {
        Self::new(SecretKeyFactory::random())
    }

    pub fn label_secret(&self, label: &[u8]) -> SecretKey {
        self.factory.make_key(label)
    }

    pub fn policy_encrypting_key(&self, label: &[u8]) -> PublicKey {
        self.label_secret(label).public_key()
    }
}

/// An actor's assembled capabilities.
pub struct Keyring {
    signing: Option<SigningPower>,
    decrypting: Option<DecryptingPower>,
    delegating: Option<DelegatingPower>,
}

impl Keyring {
    pub fn new(
        signing: Option<SigningPower>,
        decrypting: Option<DecryptingPower>,
        delegating: Option<DelegatingPower>,
    ) -> Self {
        Self {
            signing,
            decrypting,
            delegating,
        }
    }

    /// Fresh grantor material: signing + delegating.
    pub fn random_grantor() -> Self {
        Self::new(
            Some(SigningPower::random()),
            None,
            Some(DelegatingPower::random()),
        )
    }

    /// Fresh grantee material: signing + decrypting.
    pub fn random_grantee() -> Self {
        Self::new(
            Some(SigningPower::random()),
            Some(DecryptingPower::random()),
            None,
        )
    }

    /// Fresh proxy material: signing only.
    pub fn random_proxy() -> Self {
        Self::new(Some(SigningPower::random()), None, None)
    }

    pub fn signing(&self) -> Result<&SigningPower, MissingCapability> {
        self.signing.as_ref().ok_or(MissingCapability("signing"))
    }

    pub fn decrypting(&self) -> Result<&DecryptingPower, MissingCapability> {
        self.decrypting
            .as_ref()
            .ok_or(MissingCapability("decrypting"))
    }

    pub fn delegating(&self) -> Result<&DelegatingPower, MissingCapability> {
        self.delegating
            .as_ref()
            .ok_or(MissingCapability("delegating"))
    }

    /// The shareable half of this keyring.
    pub fn public_card(&self) -> PublicCard {
        PublicCard {
            verifying_key: self.signing.as_ref().map(|p| p.verifying_key()),
            encrypting_key: self.decrypting.as_ref().map(|p| p.public_key()),
        }
    }
}

/// Public keys another actor may learn about this one. Passed by value into
/// the calls that need it; there is no ambient per-actor registry.
#[derive(Clone, Copy, Debug)]
pub struct PublicCard {
    pub verifying_key: Option<PublicKey>,
    pub encrypting_key: Option<PublicKey>,
}

impl PublicCard {
    pub fn verifying_key(&self) -> Result<PublicKey, MissingCapability> {
        self.verifying_key.ok_or(MissingCapability("signing"))
    }

    pub fn encrypting_key(&self) -> Result<PublicKey, MissingCapability> {
        self.encrypting_key.ok_or(MissingCapability("decrypting"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capability_is_typed() {
        let proxy = Keyring::random_proxy();
        assert!(proxy.signing().is_ok());
        assert_eq!(
            proxy.delegating().err(),
            Some(MissingCapability("delegating"))
        );
        assert_eq!(
            proxy.decrypting().err(),
            Some(MissingCapability("decrypting"))
        );
    }

    #[test]
    fn label_derivation_is_idempotent() {
        let grantor = Keyring::random_grantor();
        let delegating = grantor.delegating().unwrap();
        let first = delegating.policy_encrypting_key(b"label-a");
        let second = delegating.policy_encrypting_key(b"label-a");
        assert_eq!(first, second);
        assert_ne!(first, delegating.policy_encrypting_key(b"label-b"));
    }

    #[test]
    fn signatures_verify_under_the_advertised_key() {
        let grantor = Keyring::random_grantor();
        let signing = grantor.signing().unwrap();
        let signature = signing.sign(b"message");
        assert!(signature.verify(&signing.verifying_key(), b"message"));
        assert!(!signature.verify(&signing.verifying_key(), b"other message"));
    }
}
