// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::GrantConfig;
use capsa_network::{PeerDirectory, PeerInfo, ProxyClient, PublicationSink};
use capsa_quorum_dispatch::{
    Aggregator, DispatchError, Progress, QuorumDispatch, QuorumSender,
};
use capsa_types::{
    crypto::{kfrag_to_bytes, public_key_to_bytes},
    destination_map::{
        DestinationMapPayload, MapError, RoutingEntry, SealedDestinationMap, SignedDestinationMap,
    },
    keyring::{Keyring, MissingCapability, PublicCard},
    protocol::{
        ArrangementOffer, ArrangementResponse, ProtocolError, RevocationOrder,
        SignedArrangementOffer,
    },
    PolicyId, ProxyId,
};
use futures::{stream::FuturesUnordered, StreamExt};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{info, warn};
use umbral_pre::{generate_kfrags, PublicKey};

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("Invalid threshold {m}-of-{n}")]
    InvalidThreshold { m: u16, n: u16 },
    #[error("Policy label must not be empty")]
    EmptyLabel,
    #[error("Keyring has no {0} capability")]
    MissingCapability(&'static str),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("Accepting custodian {0} is not in the peer directory")]
    UnknownCustodian(ProxyId),
    #[error("Only {accepted} of {required} custodians accepted")]
    InsufficientCustodians { accepted: usize, required: usize },
    #[error("Publishing the destination map failed")]
    Publication(#[source] anyhow::Error),
}

impl From<MissingCapability> for GrantError {
    fn from(error: MissingCapability) -> Self {
        GrantError::MissingCapability(error.0)
    }
}

#[derive(Debug, Error)]
pub enum RevokeError {
    #[error("Keyring has no {0} capability")]
    MissingCapability(&'static str),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<MissingCapability> for RevokeError {
    fn from(error: MissingCapability) -> Self {
        RevokeError::MissingCapability(error.0)
    }
}

/// Result of a successful grant. The sealed map is also published through
/// the sink; it is carried here so the grantor can hand it out directly.
#[derive(Clone, Debug)]
pub struct Policy {
    pub policy_id: PolicyId,
    pub m: u16,
    pub n: u16,
    pub policy_key: PublicKey,
    pub custodians: Vec<ProxyId>,
    pub sealed_map: SealedDestinationMap,
    pub expiration_unix_secs: u64,
}

/// Per-custodian revocation results. Partial failure is data, not an error;
/// the caller retries the failed custodians or escalates.
#[derive(Debug)]
pub struct RevocationReport {
    pub confirmed: Vec<ProxyId>,
    pub failed: Vec<(ProxyId, String)>,
}

impl RevocationReport {
    /// Every custodian confirmed the fragment is destroyed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PolicyEngine {
    keyring: Keyring,
    client: Arc<dyn ProxyClient>,
    directory: Arc<dyn PeerDirectory>,
    sink: Arc<dyn PublicationSink>,
    config: GrantConfig,
}

impl PolicyEngine {
    pub fn new(
        keyring: Keyring,
        client: Arc<dyn ProxyClient>,
        directory: Arc<dyn PeerDirectory>,
        sink: Arc<dyn PublicationSink>,
        config: GrantConfig,
    ) -> Self {
        Self {
            keyring,
            client,
            directory,
            sink,
            config,
        }
    }

    /// Splits the re-encryption capability for `label` into `n` fragments,
    /// arranges custody with `n` proxies drawn from `candidates`, and
    /// publishes the destination map. Fails without a published map if
    /// fewer than `n` custodians accept; custody accepted before the
    /// failure remains in place and can be revoked by the caller.
    pub async fn grant(
        &self,
        grantee: &PublicCard,
        label: &[u8],
        m: u16,
        n: u16,
        expiration_unix_secs: u64,
        candidates: Vec<ProxyId>,
    ) -> Result<Policy, GrantError> {
        if m == 0 || m > n {
            return Err(GrantError::InvalidThreshold { m, n });
        }
        if label.is_empty() {
            return Err(GrantError::EmptyLabel);
        }
        let signing = self.keyring.signing()?;
        let delegating = self.keyring.delegating()?;
        let grantee_verifying = grantee.verifying_key()?;
        let grantee_encrypting = grantee.encrypting_key()?;

        let grantor_verifying = signing.verifying_key();
        let policy_key = delegating.policy_encrypting_key(label);
        let policy_id = PolicyId::new(&grantor_verifying, &grantee_verifying, label);

        let kfrags = generate_kfrags(
            &delegating.label_secret(label),
            &grantee_encrypting,
            signing.signer(),
            m as usize,
            n as usize,
            true,
            true,
        );

        let mut offers = Vec::with_capacity(kfrags.len());
        for kfrag in kfrags.iter() {
            let offer = ArrangementOffer {
                policy_id,
                grantor_verifying: public_key_to_bytes(&grantor_verifying),
                grantee_verifying: public_key_to_bytes(&grantee_verifying),
                grantee_decrypting: public_key_to_bytes(&grantee_encrypting),
                policy_key: public_key_to_bytes(&policy_key),
                label: label.to_vec(),
                fragment: kfrag_to_bytes(kfrag),
                expiration_unix_secs,
            };
            offers.push(SignedArrangementOffer::sign(offer, signing)?);
        }

        // Only candidates the directory can route to are worth offering
        // custody; an accepted custodian must end up in the map.
        let mut peer_info: HashMap<ProxyId, PeerInfo> = HashMap::new();
        let pool: Vec<ProxyId> = candidates
            .into_iter()
            .filter(|candidate| match self.directory.resolve(candidate) {
                Some(info) => {
                    peer_info.insert(*candidate, info);
                    true
                },
                None => false,
            })
            .collect();

        let dispatch = QuorumDispatch::new(
            Arc::new(ArrangementSender {
                client: self.client.clone(),
            }),
            self.config.arrangement_rpc_timeout(),
        );
        let custodians = dispatch
            .dispatch(offers, pool, CustodianAggregator {
                required: n as usize,
                accepted: Vec::new(),
            })
            .await
            .map_err(|DispatchError::Exhausted { collected }| {
                GrantError::InsufficientCustodians {
                    accepted: collected,
                    required: n as usize,
                }
            })?;

        let mut entries = BTreeMap::new();
        for custodian in &custodians {
            let info = peer_info
                .get(custodian)
                .ok_or(GrantError::UnknownCustodian(*custodian))?;
            let entry = RoutingEntry {
                proxy: *custodian,
                endpoint: info.endpoint.clone(),
                verifying_key: public_key_to_bytes(&info.verifying_key),
            };
            entries.insert(*custodian, entry.seal_for(&grantee_encrypting)?);
        }
        let payload = DestinationMapPayload {
            policy_id,
            m,
            n,
            policy_key: public_key_to_bytes(&policy_key),
            entries,
        };
        let signed_map = SignedDestinationMap::sign(&payload, signing)?;
        let sealed_map = SealedDestinationMap::seal(&signed_map, &grantee_encrypting)?;
        self.sink
            .publish(policy_id, sealed_map.to_bytes()?)
            .await
            .map_err(GrantError::Publication)?;

        info!(
            policy_id = %policy_id,
            m,
            n,
            custodians = custodians.len(),
            "granted policy, destination map published"
        );
        Ok(Policy {
            policy_id,
            m,
            n,
            policy_key,
            custodians,
            sealed_map,
            expiration_unix_secs,
        })
    }

    /// Sends one signed revocation to every custodian concurrently, a
    /// single attempt each. The published map is never deleted; a revoked
    /// policy simply stops yielding fragments.
    pub async fn revoke(&self, policy: &Policy) -> Result<RevocationReport, RevokeError> {
        let signing = self.keyring.signing()?;
        let order = RevocationOrder::sign(policy.policy_id, signing)?;
        let timeout = self.config.revocation_rpc_timeout();

        let mut inflight: FuturesUnordered<_> = policy
            .custodians
            .iter()
            .map(|custodian| {
                let client = self.client.clone();
                let order = order.clone();
                let custodian = *custodian;
                async move {
                    (
                        custodian,
                        client.submit_revocation(custodian, order, timeout).await,
                    )
                }
            })
            .collect();

        let mut report = RevocationReport {
            confirmed: Vec::new(),
            failed: Vec::new(),
        };
        while let Some((custodian, result)) = inflight.next().await {
            match result {
                Ok(outcome) if outcome.is_confirmed() => report.confirmed.push(custodian),
                Ok(outcome) => {
                    warn!(
                        policy_id = %policy.policy_id,
                        "custodian {} did not confirm revocation: {:?}", custodian, outcome
                    );
                    report.failed.push((custodian, format!("{:?}", outcome)));
                },
                Err(e) => {
                    warn!(
                        policy_id = %policy.policy_id,
                        error = ?e,
                        "revocation rpc to {} failed", custodian
                    );
                    report.failed.push((custodian, e.to_string()));
                },
            }
        }
        Ok(report)
    }
}

struct ArrangementSender {
    client: Arc<dyn ProxyClient>,
}

#[async_trait::async_trait]
impl QuorumSender<SignedArrangementOffer, ArrangementResponse> for ArrangementSender {
    async fn send_rpc(
        &self,
        peer: ProxyId,
        request: SignedArrangementOffer,
        timeout: Duration,
    ) -> anyhow::Result<ArrangementResponse> {
        self.client.request_arrangement(peer, request, timeout).await
    }
}

/// Collects acceptances until every fragment has a custodian. Rejections
/// surface as errors so the dispatcher reassigns the fragment.
struct CustodianAggregator {
    required: usize,
    accepted: Vec<ProxyId>,
}

impl Aggregator<SignedArrangementOffer, ArrangementResponse> for CustodianAggregator {
    type Aggregated = Vec<ProxyId>;

    fn add(
        &mut self,
        peer: ProxyId,
        request: &SignedArrangementOffer,
        response: ArrangementResponse,
    ) -> anyhow::Result<Progress<Self::Aggregated>> {
        match response {
            ArrangementResponse::Accepted { policy_id, proxy } => {
                anyhow::ensure!(
                    proxy == peer && policy_id == request.offer.policy_id,
                    "acceptance from {} does not match the offer",
                    peer
                );
                self.accepted.push(peer);
                if self.accepted.len() >= self.required {
                    Ok(Progress::Done(std::mem::take(&mut self.accepted)))
                } else {
                    Ok(Progress::Collecting {
                        have: self.accepted.len(),
                        need: self.required,
                    })
                }
            },
            ArrangementResponse::Rejected { reason, .. } => {
                anyhow::bail!("custody offer declined: {}", reason)
            },
        }
    }
}
