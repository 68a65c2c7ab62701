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


//! In-memory chains used by the tests of every crate of the workspace.
//!
//! All mocks record what was asked of them and answer from scripted state.

mod central;
mod observer;
mod signer;

pub use central::MockCentralChain;
pub use observer::{MockChainObserver, MockItem};
pub use signer::{MockChainSigner, MockTx, MOCK_PROTOCOL_VERSION};
