// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network seams for the delegation protocol.
//!
//! The engines in `capsa-policy` and `capsa-retrieval` never open sockets
//! themselves; they speak to proxies through [`ProxyClient`], discover them
//! through [`PeerDirectory`], and publish destination maps through
//! [`PublicationSink`]. Deployments plug in a real transport behind these
//! traits; the in-memory implementations here back the local test clusters.

pub mod client;
pub mod directory;
pub mod publication;

pub use client::ProxyClient;
pub use directory::{PeerDirectory, PeerInfo, StaticPeerDirectory};
pub use publication::{InMemoryPublicationSink, PublicationSink};
