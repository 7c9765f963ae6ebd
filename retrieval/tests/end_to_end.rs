// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Full grant / seal / retrieve / revoke flows over an in-process proxy
//! cluster.

use capsa_network::{InMemoryPublicationSink, PublicationSink, StaticPeerDirectory};
use capsa_policy::{GrantConfig, Policy, PolicyEngine};
use capsa_proxy::testing::LocalProxyCluster;
use capsa_retrieval::{RetrievalConfig, RetrievalEngine, RetrieveError};
use capsa_types::{
    destination_map::SealedDestinationMap,
    keyring::{Keyring, PublicCard},
    message_kit::MessageKit,
    time::Clock,
};
use std::sync::Arc;
use umbral_pre::PublicKey;

const LABEL: &[u8] = b"vault/medical/2026";
const EXPIRATION: u64 = 100_000;
const PLAINTEXTS: [&[u8]; 2] = [b"first record", b"second record"];

struct Net {
    cluster: Arc<LocalProxyCluster>,
    sink: Arc<InMemoryPublicationSink>,
    grantor: PolicyEngine,
    grantor_verifying: PublicKey,
    grantee_card: PublicCard,
    retrieval: RetrievalEngine,
}

fn net(proxies: usize) -> Net {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let (clock, _handle) = Clock::manual(1_000);
    let cluster = Arc::new(LocalProxyCluster::new(proxies, clock));
    let directory = Arc::new(StaticPeerDirectory::new(cluster.peer_entries()));
    let sink = Arc::new(InMemoryPublicationSink::new());
    let grantor_keyring = Keyring::random_grantor();
    let grantor_verifying = grantor_keyring.signing().unwrap().verifying_key();
    let grantor = PolicyEngine::new(
        grantor_keyring,
        cluster.clone(),
        directory,
        sink.clone(),
        GrantConfig::default(),
    );
    let grantee = Keyring::random_grantee();
    let grantee_card = grantee.public_card();
    let retrieval = RetrievalEngine::new(grantee, cluster.clone(), RetrievalConfig::default());
    Net {
        cluster,
        sink,
        grantor,
        grantor_verifying,
        grantee_card,
        retrieval,
    }
}

async fn grant(net: &Net, m: u16, n: u16) -> Policy {
    net.grantor
        .grant(
            &net.grantee_card,
            LABEL,
            m,
            n,
            EXPIRATION,
            net.cluster.proxy_ids(),
        )
        .await
        .unwrap()
}

fn seal_all(policy: &Policy) -> Vec<MessageKit> {
    PLAINTEXTS
        .iter()
        .map(|plaintext| MessageKit::seal(&policy.policy_key, plaintext).unwrap())
        .collect()
}

#[tokio::test]
async fn grantee_reads_through_the_published_map() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;
    let kits = seal_all(&policy);

    // The grantee starts from the publication sink, not from the grantor.
    let published = net.sink.fetch(&policy.policy_id).await.unwrap().unwrap();
    let sealed = SealedDestinationMap::from_bytes(&published).unwrap();
    let plaintexts = net
        .retrieval
        .retrieve_sealed(&sealed, &net.grantor_verifying, &kits)
        .await
        .unwrap();
    assert_eq!(plaintexts, PLAINTEXTS.map(|p| p.to_vec()).to_vec());
}

#[tokio::test]
async fn one_unresponsive_custodian_does_not_block_a_2_of_3_policy() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;
    let kits = seal_all(&policy);
    net.cluster.set_unresponsive(policy.custodians[0]);

    let resolution = net
        .retrieval
        .resolve_map(&policy.sealed_map, &net.grantor_verifying)
        .unwrap();
    let plaintexts = net.retrieval.retrieve(&resolution, &kits).await.unwrap();
    assert_eq!(plaintexts[0], PLAINTEXTS[0]);
}

#[tokio::test]
async fn a_3_of_3_policy_fails_once_any_custodian_is_revoked() {
    let net = net(3);
    let policy = grant(&net, 3, 3).await;
    let kits = seal_all(&policy);

    let target = policy.custodians[1];
    let single = Policy {
        custodians: vec![target],
        ..policy.clone()
    };
    assert!(net.grantor.revoke(&single).await.unwrap().is_complete());

    let resolution = net
        .retrieval
        .resolve_map(&policy.sealed_map, &net.grantor_verifying)
        .unwrap();
    match net.retrieval.retrieve(&resolution, &kits).await {
        Err(RetrieveError::InsufficientProxies { verified, required }) => {
            assert_eq!(verified, 2);
            assert_eq!(required, 3);
        },
        other => panic!("expected exhaustion, got {:?}", other.map(|p| p.len())),
    }
}

#[tokio::test]
async fn revocation_of_every_custodian_is_final() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;
    let kits = seal_all(&policy);

    let report = net.grantor.revoke(&policy).await.unwrap();
    assert!(report.is_complete());

    let resolution = net
        .retrieval
        .resolve_map(&policy.sealed_map, &net.grantor_verifying)
        .unwrap();
    assert!(matches!(
        net.retrieval.retrieve(&resolution, &kits).await,
        Err(RetrieveError::InsufficientProxies { verified: 0, .. })
    ));
}

#[tokio::test]
async fn a_map_signed_by_another_grantor_is_rejected_outright() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;

    let impostor = Keyring::random_grantor().signing().unwrap().verifying_key();
    assert!(matches!(
        net.retrieval.resolve_map(&policy.sealed_map, &impostor),
        Err(RetrieveError::UntrustedDestinationMap)
    ));
}

#[tokio::test]
async fn a_map_sealed_for_someone_else_is_unreadable() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;

    let outsider = RetrievalEngine::new(
        Keyring::random_grantee(),
        net.cluster.clone(),
        RetrievalConfig::default(),
    );
    assert!(matches!(
        outsider.resolve_map(&policy.sealed_map, &net.grantor_verifying),
        Err(RetrieveError::UntrustedDestinationMap)
    ));
}

#[tokio::test]
async fn a_tampered_map_sends_no_work_orders() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;
    let kits = seal_all(&policy);

    let mut bytes = policy.sealed_map.to_bytes().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    // The flip may already break decoding; if it survives that far, the
    // unseal rejects it. Either way no proxy hears about it.
    if let Ok(sealed) = SealedDestinationMap::from_bytes(&bytes) {
        assert!(matches!(
            net.retrieval
                .retrieve_sealed(&sealed, &net.grantor_verifying, &kits)
                .await,
            Err(RetrieveError::UntrustedDestinationMap)
        ));
    }
    assert_eq!(net.cluster.work_orders_sent(), 0);
}

#[tokio::test]
async fn an_intruder_with_the_map_cannot_extract_fragments() {
    let net = net(3);
    let policy = grant(&net, 2, 3).await;
    let kits = seal_all(&policy);

    // The intruder somehow learned the routing information but signs work
    // orders with its own key. Every proxy refuses and logs suspicion.
    let resolution = net
        .retrieval
        .resolve_map(&policy.sealed_map, &net.grantor_verifying)
        .unwrap();
    let intruder = RetrievalEngine::new(
        Keyring::random_grantee(),
        net.cluster.clone(),
        RetrievalConfig::default(),
    );
    assert!(matches!(
        intruder.retrieve(&resolution, &kits).await,
        Err(RetrieveError::InsufficientProxies { verified: 0, .. })
    ));
    for proxy in &policy.custodians {
        let service = net.cluster.service(proxy).unwrap();
        assert!(!service.suspicion().snapshot().is_empty());
    }
}

#[tokio::test]
async fn different_threshold_subsets_recover_the_same_plaintext() {
    let net = net(4);
    let policy = grant(&net, 2, 4).await;
    let kits = seal_all(&policy);
    let resolution = net
        .retrieval
        .resolve_map(&policy.sealed_map, &net.grantor_verifying)
        .unwrap();

    net.cluster.set_unresponsive(policy.custodians[0]);
    net.cluster.set_unresponsive(policy.custodians[1]);
    let first = net.retrieval.retrieve(&resolution, &kits).await.unwrap();

    net.cluster.set_responsive(policy.custodians[0]);
    net.cluster.set_responsive(policy.custodians[1]);
    net.cluster.set_unresponsive(policy.custodians[2]);
    net.cluster.set_unresponsive(policy.custodians[3]);
    let second = net.retrieval.retrieve(&resolution, &kits).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first[1], PLAINTEXTS[1]);
}
