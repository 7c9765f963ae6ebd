// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use capsa_types::ProxyId;
use std::collections::HashMap;
use umbral_pre::PublicKey;

/// What a grantor needs to know about a proxy before offering it custody.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub endpoint: String,
    pub verifying_key: PublicKey,
}

/// Source of candidate proxies for policy grants.
pub trait PeerDirectory: Send + Sync {
    /// All proxies currently advertised, in directory order.
    fn known_peers(&self) -> Vec<ProxyId>;

    fn resolve(&self, proxy: &ProxyId) -> Option<PeerInfo>;
}

/// Fixed directory, handed its membership at construction.
pub struct StaticPeerDirectory {
    peers: Vec<ProxyId>,
    info: HashMap<ProxyId, PeerInfo>,
}

impl StaticPeerDirectory {
    pub fn new(entries: Vec<(ProxyId, PeerInfo)>) -> Self {
        let peers = entries.iter().map(|(id, _)| *id).collect();
        Self {
            peers,
            info: entries.into_iter().collect(),
        }
    }
}

impl PeerDirectory for StaticPeerDirectory {
    fn known_peers(&self) -> Vec<ProxyId> {
        self.peers.clone()
    }

    fn resolve(&self, proxy: &ProxyId) -> Option<PeerInfo> {
        self.info.get(proxy).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbral_pre::SecretKey;

    #[test]
    fn static_directory_preserves_order_and_resolves() {
        let entries: Vec<_> = (0..3)
            .map(|i| {
                let key = SecretKey::random().public_key();
                (ProxyId::from_verifying_key(&key), PeerInfo {
                    endpoint: format!("proxy-{}.local:9150", i),
                    verifying_key: key,
                })
            })
            .collect();
        let ids: Vec<_> = entries.iter().map(|(id, _)| *id).collect();

        let directory = StaticPeerDirectory::new(entries);
        assert_eq!(directory.known_peers(), ids);
        assert_eq!(
            directory.resolve(&ids[1]).unwrap().endpoint,
            "proxy-1.local:9150"
        );
        let unknown = ProxyId::from_verifying_key(&SecretKey::random().public_key());
        assert!(directory.resolve(&unknown).is_none());
    }
}
