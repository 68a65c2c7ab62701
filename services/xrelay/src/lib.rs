// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # XRelay 🕸️
//!
//! A cross-chain relay client. One process runs per member of the signing
//! committee and does two things for every connected chain:
//!
//! #### Inbound
//!
//! The [`Observer`](xrelay_observer::Observer) scans the chain's gateway
//! events and votes on every deposit on the central chain, which turns enough
//! matching votes into a cross-chain transfer.
//!
//! #### Outbound
//!
//! Once the central chain decided that a transfer must happen on a connected
//! chain, the [`Signer`](xrelay_signer::Signer) builds the transaction, has it
//! signed by the threshold signing service, broadcasts it, waits for it to
//! be final and reports it back.
//!
//! The [`Orchestrator`](orchestrator::Orchestrator) keeps one scheduler group
//! of tasks per enabled chain and follows configuration changes.

/// Wires chains, the central chain and the signing service together.
pub mod orchestrator;

/// In-process chains for dry runs.
#[cfg(feature = "loopback")]
pub mod loopback;

pub use xrelay_utils::{Error, Result};
