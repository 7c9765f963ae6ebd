// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

use capsa_types::{
    protocol::{
        ArrangementResponse, RevocationOrder, RevocationOutcome, SignedArrangementOffer,
        WorkOrder, WorkOrderOutcome,
    },
    ProxyId,
};
use std::time::Duration;

/// RPC surface a proxy exposes to grantors and grantees.
///
/// Implementations are expected to enforce `timeout` on the wire and fold
/// transport failures into the `anyhow::Error`; protocol-level refusals
/// (a rejected offer, a rejected work order) travel inside the `Ok`
/// variants so callers can tell an unreachable proxy from an unwilling one.
#[async_trait::async_trait]
pub trait ProxyClient: Send + Sync {
    async fn request_arrangement(
        &self,
        proxy: ProxyId,
        offer: SignedArrangementOffer,
        timeout: Duration,
    ) -> anyhow::Result<ArrangementResponse>;

    async fn submit_work_order(
        &self,
        proxy: ProxyId,
        order: WorkOrder,
        timeout: Duration,
    ) -> anyhow::Result<WorkOrderOutcome>;

    async fn submit_revocation(
        &self,
        proxy: ProxyId,
        order: RevocationOrder,
        timeout: Duration,
    ) -> anyhow::Result<RevocationOutcome>;
}
