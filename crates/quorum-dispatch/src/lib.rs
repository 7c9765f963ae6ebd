// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Concurrent fan-out of request jobs to a pool of candidate peers.
//!
//! Callers hand over a set of jobs, a pool of candidates and an
//! [`Aggregator`]. Every job is dispatched to one candidate; candidates are
//! used at most once. A job whose RPC fails, or whose response the
//! aggregator rejects, is reassigned to the next unused candidate. The run
//! ends as soon as the aggregator reports [`Progress::Done`], or with
//! [`DispatchError::Exhausted`] once no candidates remain. The threshold is
//! never silently lowered.
//!
//! Peers are independent; responses are aggregated in whatever order they
//! arrive.

use capsa_types::ProxyId;
use futures::{stream::FuturesUnordered, StreamExt};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::info;

#[async_trait::async_trait]
pub trait QuorumSender<Req, Res>: Send + Sync {
    /// One RPC to one peer, bounded by `timeout`. A timeout is a failure of
    /// this call only.
    async fn send_rpc(&self, peer: ProxyId, request: Req, timeout: Duration)
        -> anyhow::Result<Res>;
}

/// Accumulator state reported by an [`Aggregator`] after each response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress<T> {
    Collecting { have: usize, need: usize },
    Done(T),
}

pub trait Aggregator<Req, Res>: Send {
    type Aggregated;

    /// Folds one response in. `Err` means the response is rejected (bad
    /// proof, typed refusal) and the job will be reassigned to a fresh
    /// candidate.
    fn add(
        &mut self,
        peer: ProxyId,
        request: &Req,
        response: Res,
    ) -> anyhow::Result<Progress<Self::Aggregated>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Candidate pool exhausted with {collected} responses aggregated")]
    Exhausted { collected: usize },
}

pub struct QuorumDispatch<Req, Res> {
    sender: Arc<dyn QuorumSender<Req, Res>>,
    rpc_timeout: Duration,
}

impl<Req, Res> QuorumDispatch<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub fn new(sender: Arc<dyn QuorumSender<Req, Res>>, rpc_timeout: Duration) -> Self {
        Self {
            sender,
            rpc_timeout,
        }
    }

    /// Runs the jobs against the candidate pool until the aggregator is
    /// done or the pool is exhausted. Callers own the overall deadline;
    /// wrap the returned future in `tokio::time::timeout` to bound it.
    pub async fn dispatch<A>(
        &self,
        jobs: Vec<Req>,
        candidates: Vec<ProxyId>,
        mut aggregator: A,
    ) -> Result<A::Aggregated, DispatchError>
    where
        A: Aggregator<Req, Res>,
    {
        let mut pool: VecDeque<ProxyId> = candidates.into();
        let mut pending: VecDeque<Req> = jobs.into();
        let mut inflight = FuturesUnordered::new();
        let mut collected = 0usize;

        let send_job = |peer: ProxyId, request: Req| {
            let sender = self.sender.clone();
            let rpc_timeout = self.rpc_timeout;
            async move {
                let result = sender.send_rpc(peer, request.clone(), rpc_timeout).await;
                (peer, request, result)
            }
        };

        loop {
            while !pending.is_empty() {
                let Some(peer) = pool.pop_front() else {
                    break;
                };
                let request = pending.pop_front().expect("pending checked non-empty");
                inflight.push(send_job(peer, request));
            }

            let Some((peer, request, result)) = inflight.next().await else {
                return Err(DispatchError::Exhausted { collected });
            };

            match result {
                Ok(response) => match aggregator.add(peer, &request, response) {
                    Ok(Progress::Done(aggregated)) => return Ok(aggregated),
                    Ok(Progress::Collecting { have, .. }) => collected = have,
                    Err(e) => {
                        info!(error = ?e, "response from {} rejected, reassigning job", peer);
                        pending.push_back(request);
                    },
                },
                Err(e) => {
                    info!(error = ?e, "rpc to {} failed, reassigning job", peer);
                    pending.push_back(request);
                },
            }
        }
    }
}
