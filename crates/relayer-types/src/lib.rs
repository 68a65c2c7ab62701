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


//! Plain data types shared by every component of the relay client.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

pub mod block;
pub mod capability;
pub mod cursor;
pub mod inbound;
pub mod outbound;
pub mod rpc_url;
pub mod signing;

pub use block::CentralBlock;
pub use rpc_url::RpcEndpoint;
pub use capability::CapabilityHandle;
pub use cursor::Cursor;
pub use inbound::{CanonicalInbound, InboundTracker, InboundVote};
pub use outbound::{
    CoinType, FailureKind, OutboundIntent, OutboundState, OutboundTracker,
    OutboundVote, TrackedOutbound, TxHandle, TxStatus,
};
pub use signing::{Digest, Signature};

/// Identifier of a connected chain, as known by the central chain.
#[derive(
    Debug,
    Display,
    From,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub i64);

impl ChainId {
    /// The raw chain id.
    pub fn get(self) -> i64 {
        self.0
    }
}

/// Ballot identifier returned by the central chain for a vote.
pub type BallotId = String;
