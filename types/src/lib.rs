// Copyright © Capsa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core domain types for the capsa proxy re-encryption network.
//!
//! Everything that crosses a trust boundary lives here: actor keyrings,
//! policy identifiers, arrangement offers, work orders, destination maps and
//! the custody records proxies keep. Wire structures serialize with `bcs`;
//! umbral objects travel as their canonical byte encoding and are parsed at
//! the seams in [`crypto`].

pub mod crypto;
pub mod custody;
pub mod destination_map;
pub mod ids;
pub mod keyring;
pub mod message_kit;
pub mod protocol;
pub mod sync;
pub mod time;

pub use ids::{PolicyId, ProxyId};
