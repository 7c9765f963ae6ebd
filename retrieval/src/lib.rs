// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Grantee-side engine. Resolves a published destination map (signature
//! first, entries second), fans a signed work order out to `m` proxies plus
//! overselection, admits only partial results whose correctness proofs
//! verify, and combines the first `m` valid ones into plaintext.

mod config;
mod engine;

pub use config::RetrievalConfig;
pub use engine::{PolicyResolution, ResolvedRoute, RetrievalEngine, RetrieveError};
