// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Grantor-side engine. A grant splits the re-encryption capability for one
//! label into `n` signed fragments, arranges custody with `n` distinct
//! proxies, and publishes a signed, grantee-encrypted destination map.
//! Revocation is one signed order to every custodian.
//!
//! The engine holds key material and injected seams only; every grant is
//! self-contained and nothing persists between calls.

mod config;
mod engine;

pub use config::GrantConfig;
pub use engine::{GrantError, Policy, PolicyEngine, RevocationReport, RevokeError};
