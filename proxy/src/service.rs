// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Custody state machine for one proxy. A policy moves through
//! `NONE -> ACTIVE -> REVOKED | EXPIRED`; the offer/accept exchange is a
//! single atomic call, so there is no externally visible OFFERED state.

use crate::{config::ProxyConfig, store::AdmitOutcome, suspicion::SuspicionLedger, CustodyStore};
use capsa_types::{
    crypto::{capsule_from_bytes, cfrag_to_bytes, kfrag_from_bytes, public_key_from_bytes},
    custody::{CustodyRecord, CustodyState},
    keyring::SigningPower,
    protocol::{
        ArrangementRejectReason, ArrangementResponse, RevocationOrder, RevocationOutcome,
        SignedArrangementOffer, WorkOrder, WorkOrderOutcome, WorkOrderReceipt, WorkOrderRejection,
    },
    sync::Mutex,
    time::Clock,
    PolicyId, ProxyId,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};
use umbral_pre::{reencrypt, PublicKey, VerifiedKeyFrag};

pub struct ProxyService {
    signing: SigningPower,
    proxy_id: ProxyId,
    store: Arc<dyn CustodyStore>,
    clock: Clock,
    config: ProxyConfig,
    suspicion: SuspicionLedger,
    /// Serializes the revoked-check / re-encrypt pair against revocation for
    /// the same policy. Uncontended across policies.
    policy_locks: Mutex<HashMap<PolicyId, Arc<Mutex<()>>>>,
}

impl ProxyService {
    pub fn new(
        signing: SigningPower,
        store: Arc<dyn CustodyStore>,
        clock: Clock,
        config: ProxyConfig,
    ) -> Self {
        let proxy_id = ProxyId::from_verifying_key(&signing.verifying_key());
        let suspicion = SuspicionLedger::new(config.suspicion_capacity);
        Self {
            signing,
            proxy_id,
            store,
            clock,
            config,
            suspicion,
            policy_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn proxy_id(&self) -> ProxyId {
        self.proxy_id
    }

    pub fn verifying_key(&self) -> PublicKey {
        self.signing.verifying_key()
    }

    pub fn suspicion(&self) -> &SuspicionLedger {
        &self.suspicion
    }

    fn policy_lock(&self, policy_id: PolicyId) -> Arc<Mutex<()>> {
        self.policy_locks
            .lock()
            .entry(policy_id)
            .or_default()
            .clone()
    }

    /// A lookup for a policy not in custody must not leave a lock behind,
    /// or requests for arbitrary ids grow the map without bound.
    fn discard_policy_lock(&self, policy_id: &PolicyId) {
        self.policy_locks.lock().remove(policy_id);
    }

    /// Validates a custody offer end to end and, if everything holds,
    /// persists the record. Every rejection is a normal protocol answer;
    /// only store failures are errors.
    pub fn consider_arrangement(
        &self,
        signed: &SignedArrangementOffer,
    ) -> anyhow::Result<ArrangementResponse> {
        let offer = &signed.offer;
        let reject = |reason| {
            Ok(ArrangementResponse::Rejected {
                policy_id: offer.policy_id,
                reason,
            })
        };

        if signed.verify_signature().is_err() {
            return reject(ArrangementRejectReason::BadSignature);
        }
        let (grantor_verifying, grantee_verifying) = match (
            public_key_from_bytes(&offer.grantor_verifying),
            public_key_from_bytes(&offer.grantee_verifying),
        ) {
            (Ok(grantor), Ok(grantee)) => (grantor, grantee),
            _ => return reject(ArrangementRejectReason::BadSignature),
        };

        // The policy id must be recomputable from the offer itself.
        let expected = PolicyId::new(&grantor_verifying, &grantee_verifying, &offer.label);
        if expected != offer.policy_id {
            return reject(ArrangementRejectReason::PolicyIdMismatch);
        }

        let now = self.clock.now_unix_secs();
        if now >= offer.expiration_unix_secs {
            return reject(ArrangementRejectReason::Expired);
        }

        if verified_fragment(
            &offer.fragment,
            &offer.policy_key,
            &offer.grantor_verifying,
            &offer.grantee_decrypting,
        )
        .is_none()
        {
            return reject(ArrangementRejectReason::InvalidFragment);
        }

        if self
            .config
            .blacklisted_grantors
            .contains(&offer.grantor_verifying)
        {
            return reject(ArrangementRejectReason::Blacklisted);
        }

        let record = CustodyRecord {
            policy_id: offer.policy_id,
            fragment: offer.fragment.clone(),
            policy_key: offer.policy_key.clone(),
            grantor_verifying: offer.grantor_verifying.clone(),
            grantee_verifying: offer.grantee_verifying.clone(),
            grantee_decrypting: offer.grantee_decrypting.clone(),
            expiration_unix_secs: offer.expiration_unix_secs,
            state: CustodyState::Active,
        };
        match self
            .store
            .admit(record, self.config.max_custody_records)?
        {
            AdmitOutcome::Admitted => {},
            AdmitOutcome::Duplicate => return reject(ArrangementRejectReason::AlreadyInCustody),
            AdmitOutcome::Full => return reject(ArrangementRejectReason::AtCapacity),
        }

        info!(
            policy_id = %offer.policy_id,
            expiration = offer.expiration_unix_secs,
            "accepted custody arrangement"
        );
        Ok(ArrangementResponse::Accepted {
            policy_id: offer.policy_id,
            proxy: self.proxy_id,
        })
    }

    /// Re-encrypts every capsule in the order under the stored fragment.
    /// Holds the policy lock for the whole call so a concurrent revocation
    /// either lands before the state check or after the receipt is signed,
    /// never in between.
    pub fn service_work_order(&self, order: &WorkOrder) -> anyhow::Result<WorkOrderOutcome> {
        let lock = self.policy_lock(order.policy_id);
        let _guard = lock.lock();

        let Some(record) = self.store.get(&order.policy_id)? else {
            self.discard_policy_lock(&order.policy_id);
            return Ok(Err(WorkOrderRejection::PolicyNotFound(order.policy_id)));
        };
        // Lazy expiry: a record past its deadline is refused exactly like a
        // revoked one, whether or not the sweep has run.
        if !record.is_serviceable(self.clock.now_unix_secs()) {
            return Ok(Err(WorkOrderRejection::PolicyRevoked(order.policy_id)));
        }

        // Identity is bound at arrangement time; the order must present that
        // exact key and a signature under it.
        if order.grantee_verifying != record.grantee_verifying
            || order.verify_signature().is_err()
        {
            warn!(
                policy_id = %order.policy_id,
                "work order failed identity check, recording suspicion"
            );
            self.suspicion.record(&order.grantee_verifying);
            return Ok(Err(WorkOrderRejection::InvalidSignature(order.policy_id)));
        }

        let Some(kfrag) = verified_fragment(
            &record.fragment,
            &record.policy_key,
            &record.grantor_verifying,
            &record.grantee_decrypting,
        ) else {
            anyhow::bail!(
                "stored fragment for policy {} no longer verifies",
                record.policy_id
            );
        };

        let mut cfrags = Vec::with_capacity(order.capsules.len());
        for capsule_bytes in &order.capsules {
            let Ok(capsule) = capsule_from_bytes(capsule_bytes) else {
                return Ok(Err(WorkOrderRejection::Malformed(order.policy_id)));
            };
            cfrags.push(cfrag_to_bytes(&reencrypt(&capsule, kfrag.clone())));
        }

        let receipt = WorkOrderReceipt::sign(order.policy_id, cfrags, &self.signing)
            .map_err(|e| anyhow::anyhow!("receipt signing failed: {}", e))?;
        Ok(Ok(receipt))
    }

    /// Destroys the fragment for a policy on the grantor's signed order.
    /// Idempotent; verification uses the grantor key recorded at
    /// arrangement time, never a key carried by the request.
    pub fn process_revocation(
        &self,
        order: &RevocationOrder,
    ) -> anyhow::Result<RevocationOutcome> {
        let lock = self.policy_lock(order.policy_id);
        let _guard = lock.lock();

        let Some(mut record) = self.store.get(&order.policy_id)? else {
            self.discard_policy_lock(&order.policy_id);
            return Ok(RevocationOutcome::NotFound(order.policy_id));
        };
        let Ok(grantor_verifying) = public_key_from_bytes(&record.grantor_verifying) else {
            anyhow::bail!(
                "stored grantor key for policy {} is malformed",
                order.policy_id
            );
        };
        if order.verify_signature(&grantor_verifying).is_err() {
            return Ok(RevocationOutcome::InvalidSignature(order.policy_id));
        }
        if record.state == CustodyState::Revoked {
            return Ok(RevocationOutcome::AlreadyRevoked(order.policy_id));
        }

        record.revoke();
        self.store.save(record)?;
        info!(policy_id = %order.policy_id, "revoked custody, fragment destroyed");
        Ok(RevocationOutcome::Revoked(order.policy_id))
    }

    /// Deletes expired rows. The service path checks expiry lazily, so the
    /// sweep only reclaims memory.
    pub fn sweep_expired(&self) -> anyhow::Result<usize> {
        let removed = self.store.remove_expired(self.clock.now_unix_secs())?;
        let mut locks = self.policy_locks.lock();
        for policy_id in &removed {
            locks.remove(policy_id);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "swept expired custody records");
        }
        Ok(removed.len())
    }
}

/// Parses and re-verifies fragment material against the keys it was issued
/// under. `None` means the material does not hold together.
fn verified_fragment(
    fragment: &[u8],
    policy_key: &[u8],
    grantor_verifying: &[u8],
    grantee_decrypting: &[u8],
) -> Option<VerifiedKeyFrag> {
    let policy_key = public_key_from_bytes(policy_key).ok()?;
    let grantor_verifying = public_key_from_bytes(grantor_verifying).ok()?;
    let grantee_decrypting = public_key_from_bytes(grantee_decrypting).ok()?;
    kfrag_from_bytes(fragment, &grantor_verifying, &policy_key, &grantee_decrypting).ok()
}
