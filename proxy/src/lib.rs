// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The proxy side of the delegation network: a custody store for key
//! fragments, the arrangement / work-order / revocation state machine, and a
//! bounded suspicion ledger for misdirected work orders.

pub mod config;
pub mod service;
pub mod store;
pub mod suspicion;
#[cfg(feature = "testing")]
pub mod testing;

pub use config::ProxyConfig;
pub use service::ProxyService;
pub use store::{AdmitOutcome, CustodyStore, InMemoryCustodyStore};
pub use suspicion::SuspicionLedger;
