// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use capsa_types::{sync::RwLock, PolicyId};
use std::collections::HashMap;

/// Side channel the grantor publishes signed destination maps to and
/// grantees fetch them from. The sink stores opaque published bytes;
/// authenticity is established by the reader, never by the channel.
#[async_trait::async_trait]
pub trait PublicationSink: Send + Sync {
    async fn publish(&self, policy_id: PolicyId, bytes: Vec<u8>) -> anyhow::Result<()>;

    /// Latest published bytes for the policy, if any.
    async fn fetch(&self, policy_id: &PolicyId) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Map-backed sink for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryPublicationSink {
    published: RwLock<HashMap<PolicyId, Vec<u8>>>,
}

impl InMemoryPublicationSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PublicationSink for InMemoryPublicationSink {
    async fn publish(&self, policy_id: PolicyId, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.published.write().insert(policy_id, bytes);
        Ok(())
    }

    async fn fetch(&self, policy_id: &PolicyId) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.published.read().get(policy_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbral_pre::SecretKey;

    fn test_policy_id() -> PolicyId {
        let grantor = SecretKey::random().public_key();
        let grantee = SecretKey::random().public_key();
        PolicyId::new(&grantor, &grantee, b"records/2026")
    }

    #[tokio::test]
    async fn publish_overwrites_and_fetch_misses_cleanly() {
        let sink = InMemoryPublicationSink::new();
        let id = test_policy_id();

        assert_eq!(sink.fetch(&id).await.unwrap(), None);
        sink.publish(id, vec![1, 2, 3]).await.unwrap();
        sink.publish(id, vec![4, 5]).await.unwrap();
        assert_eq!(sink.fetch(&id).await.unwrap(), Some(vec![4, 5]));
    }
}
