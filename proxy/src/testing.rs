// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process proxy cluster for exercising grant / retrieve / revoke flows
//! without a transport. Peers can be made unresponsive to simulate
//! availability failures.

use crate::{InMemoryCustodyStore, ProxyConfig, ProxyService};
use anyhow::bail;
use capsa_network::{PeerInfo, ProxyClient};
use capsa_types::{
    keyring::SigningPower,
    protocol::{
        ArrangementResponse, RevocationOrder, RevocationOutcome, SignedArrangementOffer,
        WorkOrder, WorkOrderOutcome,
    },
    sync::Mutex,
    time::Clock,
    ProxyId,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

pub struct LocalProxyCluster {
    proxies: HashMap<ProxyId, Arc<ProxyService>>,
    order: Vec<ProxyId>,
    unresponsive: Mutex<HashSet<ProxyId>>,
    work_orders_sent: Mutex<usize>,
}

impl LocalProxyCluster {
    pub fn new(count: usize, clock: Clock) -> Self {
        let mut proxies = HashMap::new();
        let mut order = Vec::with_capacity(count);
        for _ in 0..count {
            let service = Arc::new(ProxyService::new(
                SigningPower::random(),
                Arc::new(InMemoryCustodyStore::new()),
                clock.clone(),
                ProxyConfig::default(),
            ));
            order.push(service.proxy_id());
            proxies.insert(service.proxy_id(), service);
        }
        Self {
            proxies,
            order,
            unresponsive: Mutex::new(HashSet::new()),
            work_orders_sent: Mutex::new(0),
        }
    }

    /// Work orders dispatched to the cluster so far, including those that
    /// hit an unresponsive peer.
    pub fn work_orders_sent(&self) -> usize {
        *self.work_orders_sent.lock()
    }

    pub fn proxy_ids(&self) -> Vec<ProxyId> {
        self.order.clone()
    }

    pub fn service(&self, proxy: &ProxyId) -> Option<Arc<ProxyService>> {
        self.proxies.get(proxy).cloned()
    }

    /// Peer directory entries for every proxy in the cluster.
    pub fn peer_entries(&self) -> Vec<(ProxyId, PeerInfo)> {
        self.order
            .iter()
            .map(|id| {
                let service = &self.proxies[id];
                (*id, PeerInfo {
                    endpoint: format!("local://{}", id),
                    verifying_key: service.verifying_key(),
                })
            })
            .collect()
    }

    /// Makes every RPC to the proxy fail with a transport error.
    pub fn set_unresponsive(&self, proxy: ProxyId) {
        self.unresponsive.lock().insert(proxy);
    }

    pub fn set_responsive(&self, proxy: ProxyId) {
        self.unresponsive.lock().remove(&proxy);
    }

    fn reachable(&self, proxy: &ProxyId) -> anyhow::Result<Arc<ProxyService>> {
        if self.unresponsive.lock().contains(proxy) {
            bail!("proxy {} unreachable", proxy);
        }
        match self.proxies.get(proxy) {
            Some(service) => Ok(service.clone()),
            None => bail!("no proxy {} in cluster", proxy),
        }
    }
}

#[async_trait::async_trait]
impl ProxyClient for LocalProxyCluster {
    async fn request_arrangement(
        &self,
        proxy: ProxyId,
        offer: SignedArrangementOffer,
        _timeout: Duration,
    ) -> anyhow::Result<ArrangementResponse> {
        self.reachable(&proxy)?.consider_arrangement(&offer)
    }

    async fn submit_work_order(
        &self,
        proxy: ProxyId,
        order: WorkOrder,
        _timeout: Duration,
    ) -> anyhow::Result<WorkOrderOutcome> {
        *self.work_orders_sent.lock() += 1;
        self.reachable(&proxy)?.service_work_order(&order)
    }

    async fn submit_revocation(
        &self,
        proxy: ProxyId,
        order: RevocationOrder,
        _timeout: Duration,
    ) -> anyhow::Result<RevocationOutcome> {
        self.reachable(&proxy)?.process_revocation(&order)
    }
}
