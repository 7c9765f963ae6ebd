// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Custody persistence seam. The service is written against the trait;
//! deployments can back it with durable storage, tests use the in-memory
//! implementation.

use capsa_types::{custody::CustodyRecord, sync::RwLock, PolicyId};
use std::collections::HashMap;

/// Result of an admission attempt. Admission is atomic: the duplicate and
/// capacity checks happen under the same critical section as the insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    Duplicate,
    Full,
}

pub trait CustodyStore: Send + Sync {
    fn get(&self, policy_id: &PolicyId) -> anyhow::Result<Option<CustodyRecord>>;

    /// Inserts the record unless the policy is already in custody or the
    /// store holds `capacity` records.
    fn admit(&self, record: CustodyRecord, capacity: usize) -> anyhow::Result<AdmitOutcome>;

    /// Overwrites the record for its policy id. The row must already exist.
    fn save(&self, record: CustodyRecord) -> anyhow::Result<()>;

    /// Deletes rows whose expiration has passed and returns their ids.
    fn remove_expired(&self, now_unix_secs: u64) -> anyhow::Result<Vec<PolicyId>>;

    fn len(&self) -> anyhow::Result<usize>;

    fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Default)]
pub struct InMemoryCustodyStore {
    records: RwLock<HashMap<PolicyId, CustodyRecord>>,
}

impl InMemoryCustodyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustodyStore for InMemoryCustodyStore {
    fn get(&self, policy_id: &PolicyId) -> anyhow::Result<Option<CustodyRecord>> {
        Ok(self.records.read().get(policy_id).cloned())
    }

    fn admit(&self, record: CustodyRecord, capacity: usize) -> anyhow::Result<AdmitOutcome> {
        let mut records = self.records.write();
        if records.contains_key(&record.policy_id) {
            return Ok(AdmitOutcome::Duplicate);
        }
        if records.len() >= capacity {
            return Ok(AdmitOutcome::Full);
        }
        records.insert(record.policy_id, record);
        Ok(AdmitOutcome::Admitted)
    }

    fn save(&self, record: CustodyRecord) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.records
                .write()
                .insert(record.policy_id, record)
                .is_some(),
            "save of a policy that was never admitted"
        );
        Ok(())
    }

    fn remove_expired(&self, now_unix_secs: u64) -> anyhow::Result<Vec<PolicyId>> {
        let mut records = self.records.write();
        let expired: Vec<PolicyId> = records
            .values()
            .filter(|record| record.is_expired(now_unix_secs))
            .map(|record| record.policy_id)
            .collect();
        for policy_id in &expired {
            records.remove(policy_id);
        }
        Ok(expired)
    }

    fn len(&self) -> anyhow::Result<usize> {
        Ok(self.records.read().len())
    }
}
