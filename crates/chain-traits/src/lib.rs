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


#![warn(missing_docs)]
#![deny(unsafe_code)]
//! # Chain Traits 🕸️
//!
//! The seams between the relay core and the chains it talks to:
//!
//! * [`CentralChain`]: the coordinating chain votes and trackers are posted to.
//! * [`ChainObserver`]: reads inbound events and transaction results from a
//!   connected chain.
//! * [`ChainSigner`]: builds and broadcasts outbound transactions on a
//!   connected chain.
//! * [`ComplianceChecker`]: screens addresses before anything is relayed.
//!
//! Hand-written mocks of all of them live in [`mock`], behind the `mocks`
//! feature.

mod central;
mod compliance;
mod observer;
mod signer;

/// Mocked chains for tests.
#[cfg(any(test, feature = "mocks"))]
pub mod mock;

pub use central::CentralChain;
pub use compliance::{ComplianceChecker, RestrictedAddressList};
pub use observer::{ChainObserver, Located};
pub use signer::ChainSigner;
