// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::RetrievalConfig;
use capsa_network::ProxyClient;
use capsa_quorum_dispatch::{
    Aggregator, DispatchError, Progress, QuorumDispatch, QuorumSender,
};
use capsa_types::{
    crypto::{capsule_from_bytes, cfrag_from_bytes, public_key_from_bytes, CryptoError},
    destination_map::{RoutingEntry, SealedDestinationMap},
    keyring::{Keyring, MissingCapability},
    message_kit::MessageKit,
    protocol::{ProtocolError, WorkOrder, WorkOrderOutcome},
    PolicyId, ProxyId,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::info;
use umbral_pre::{decrypt_reencrypted, Capsule, PublicKey, VerifiedCapsuleFrag};

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("Keyring has no {0} capability")]
    MissingCapability(&'static str),
    /// The published map failed decryption, signature verification or
    /// decoding. Nothing was sent to any proxy.
    #[error("Destination map cannot be trusted")]
    UntrustedDestinationMap,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Only {verified} of {required} partial results verified")]
    InsufficientProxies { verified: usize, required: usize },
    #[error("Combining partial results failed: {0}")]
    Decryption(String),
}

impl From<MissingCapability> for RetrieveError {
    fn from(error: MissingCapability) -> Self {
        RetrieveError::MissingCapability(error.0)
    }
}

/// One custodian from a verified map, with its key material parsed.
#[derive(Clone, Debug)]
pub struct ResolvedRoute {
    pub proxy: ProxyId,
    pub endpoint: String,
    pub verifying_key: PublicKey,
}

/// A verified, decrypted destination map. Safe to cache and reuse across
/// retrievals under the same policy; maps are immutable once published.
#[derive(Clone, Debug)]
pub struct PolicyResolution {
    pub policy_id: PolicyId,
    pub m: u16,
    pub policy_key: PublicKey,
    pub grantor_verifying: PublicKey,
    pub routes: Vec<ResolvedRoute>,
}

pub struct RetrievalEngine {
    keyring: Keyring,
    client: Arc<dyn ProxyClient>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(keyring: Keyring, client: Arc<dyn ProxyClient>, config: RetrievalConfig) -> Self {
        Self {
            keyring,
            client,
            config,
        }
    }

    /// Decrypts and authenticates a published map. The grantor signature is
    /// checked over the exact payload bytes before anything is decoded; on
    /// any failure no work order goes out.
    pub fn resolve_map(
        &self,
        sealed: &SealedDestinationMap,
        grantor_verifying: &PublicKey,
    ) -> Result<PolicyResolution, RetrieveError> {
        let secret = self.keyring.decrypting()?.secret_key();
        let signed = sealed
            .unseal(secret)
            .map_err(|_| RetrieveError::UntrustedDestinationMap)?;
        let payload = signed
            .verify_and_decode(grantor_verifying)
            .map_err(|_| RetrieveError::UntrustedDestinationMap)?;

        let mut routes = Vec::with_capacity(payload.entries.len());
        for (proxy, kit) in &payload.entries {
            let entry = RoutingEntry::unseal(kit, secret)
                .map_err(|_| RetrieveError::UntrustedDestinationMap)?;
            let verifying_key = public_key_from_bytes(&entry.verifying_key)
                .map_err(|_| RetrieveError::UntrustedDestinationMap)?;
            if entry.proxy != *proxy {
                return Err(RetrieveError::UntrustedDestinationMap);
            }
            routes.push(ResolvedRoute {
                proxy: entry.proxy,
                endpoint: entry.endpoint,
                verifying_key,
            });
        }
        let policy_key = public_key_from_bytes(&payload.policy_key)
            .map_err(|_| RetrieveError::UntrustedDestinationMap)?;

        Ok(PolicyResolution {
            policy_id: payload.policy_id,
            m: payload.m,
            policy_key,
            grantor_verifying: grantor_verifying.clone(),
            routes,
        })
    }

    /// Recovers the plaintext of every kit sealed under the resolution's
    /// policy key. One signed work order carries all capsules; the engine
    /// stops as soon as `m` proxies returned verifiable partial results.
    pub async fn retrieve(
        &self,
        resolution: &PolicyResolution,
        kits: &[MessageKit],
    ) -> Result<Vec<Vec<u8>>, RetrieveError> {
        if kits.is_empty() {
            return Ok(Vec::new());
        }
        let signing = self.keyring.signing()?;
        let decrypting = self.keyring.decrypting()?;
        let required = resolution.m as usize;

        let mut capsules = Vec::with_capacity(kits.len());
        for kit in kits {
            capsules.push(capsule_from_bytes(kit.capsule_bytes())?);
        }
        let order = WorkOrder::sign(
            resolution.policy_id,
            kits.iter().map(|kit| kit.capsule_bytes().to_vec()).collect(),
            signing,
        )?;

        let aggregator = CfragAggregator {
            required,
            policy_id: resolution.policy_id,
            capsules: capsules.clone(),
            policy_key: resolution.policy_key.clone(),
            grantor_verifying: resolution.grantor_verifying.clone(),
            receiving: decrypting.public_key(),
            proxy_keys: resolution
                .routes
                .iter()
                .map(|route| (route.proxy, route.verifying_key.clone()))
                .collect(),
            collected: vec![Vec::new(); kits.len()],
        };
        let dispatch = QuorumDispatch::new(
            Arc::new(WorkOrderSender {
                client: self.client.clone(),
            }),
            self.config.rpc_timeout(),
        );
        let jobs = vec![order; required + self.config.overselection];
        let candidates: Vec<ProxyId> = resolution.routes.iter().map(|r| r.proxy).collect();
        let per_capsule = dispatch
            .dispatch(jobs, candidates, aggregator)
            .await
            .map_err(|DispatchError::Exhausted { collected }| {
                RetrieveError::InsufficientProxies {
                    verified: collected,
                    required,
                }
            })?;

        info!(
            policy_id = %resolution.policy_id,
            kits = kits.len(),
            "threshold reached, combining partial results"
        );
        let mut plaintexts = Vec::with_capacity(kits.len());
        for ((kit, capsule), cfrags) in kits.iter().zip(&capsules).zip(per_capsule) {
            let plaintext = decrypt_reencrypted(
                decrypting.secret_key(),
                &resolution.policy_key,
                capsule,
                cfrags,
                kit.ciphertext(),
            )
            .map_err(|e| RetrieveError::Decryption(format!("{:?}", e)))?;
            plaintexts.push(plaintext.into_vec());
        }
        Ok(plaintexts)
    }

    /// Resolution and retrieval in one call, for callers that do not cache
    /// resolutions.
    pub async fn retrieve_sealed(
        &self,
        sealed: &SealedDestinationMap,
        grantor_verifying: &PublicKey,
        kits: &[MessageKit],
    ) -> Result<Vec<Vec<u8>>, RetrieveError> {
        let resolution = self.resolve_map(sealed, grantor_verifying)?;
        self.retrieve(&resolution, kits).await
    }
}

struct WorkOrderSender {
    client: Arc<dyn ProxyClient>,
}

#[async_trait::async_trait]
impl QuorumSender<WorkOrder, WorkOrderOutcome> for WorkOrderSender {
    async fn send_rpc(
        &self,
        peer: ProxyId,
        request: WorkOrder,
        timeout: Duration,
    ) -> anyhow::Result<WorkOrderOutcome> {
        self.client.submit_work_order(peer, request, timeout).await
    }
}

/// Admits one receipt per proxy, verifying the receipt signature against
/// the key the map advertised and every cfrag proof against its capsule.
/// Anything that fails becomes a rejection, and the dispatcher substitutes
/// a fresh proxy from the map.
struct CfragAggregator {
    required: usize,
    policy_id: PolicyId,
    capsules: Vec<Capsule>,
    policy_key: PublicKey,
    grantor_verifying: PublicKey,
    receiving: PublicKey,
    proxy_keys: HashMap<ProxyId, PublicKey>,
    collected: Vec<Vec<VerifiedCapsuleFrag>>,
}

impl Aggregator<WorkOrder, WorkOrderOutcome> for CfragAggregator {
    type Aggregated = Vec<Vec<VerifiedCapsuleFrag>>;

    fn add(
        &mut self,
        peer: ProxyId,
        _request: &WorkOrder,
        response: WorkOrderOutcome,
    ) -> anyhow::Result<Progress<Self::Aggregated>> {
        let receipt = match response {
            Ok(receipt) => receipt,
            Err(rejection) => anyhow::bail!("work order refused: {}", rejection),
        };
        let Some(expected) = self.proxy_keys.get(&peer) else {
            anyhow::bail!("receipt from {} which is not in the map", peer);
        };
        if receipt.verify_signature(expected).is_err() {
            anyhow::bail!("receipt signature from {} rejected", peer);
        }
        anyhow::ensure!(
            receipt.policy_id == self.policy_id,
            "receipt from {} is for another policy",
            peer
        );
        anyhow::ensure!(
            receipt.cfrags.len() == self.capsules.len(),
            "receipt from {} has {} results for {} capsules",
            peer,
            receipt.cfrags.len(),
            self.capsules.len()
        );

        // All proofs must hold before any of them count.
        let mut verified = Vec::with_capacity(receipt.cfrags.len());
        for (bytes, capsule) in receipt.cfrags.iter().zip(&self.capsules) {
            verified.push(cfrag_from_bytes(
                bytes,
                capsule,
                &self.grantor_verifying,
                &self.policy_key,
                &self.receiving,
            )?);
        }
        for (per_capsule, cfrag) in self.collected.iter_mut().zip(verified) {
            per_capsule.push(cfrag);
        }

        let have = self.collected[0].len();
        if have >= self.required {
            Ok(Progress::Done(std::mem::take(&mut self.collected)))
        } else {
            Ok(Progress::Collecting {
                have,
                need: self.required,
            })
        }
    }
}
