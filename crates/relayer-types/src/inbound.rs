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


use serde::{Deserialize, Serialize};

use crate::ChainId;

/// An inbound deposit/call event, decoded from a chain-specific raw item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalInbound {
    /// Hash of the source chain transaction that emitted the event.
    pub source_tx_hash: String,
    /// Index of the event within that transaction.
    pub event_index: u64,
    /// Depositor on the source chain.
    pub sender: String,
    /// Receiver on the central chain.
    pub receiver: String,
    /// Deposited amount, in the asset's smallest unit.
    pub amount: u128,
    /// Asset identifier (empty for the chain's gas coin).
    pub asset: String,
    /// Optional call payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
    /// Whether the deposit also requests a cross-chain call.
    #[serde(default)]
    pub is_cross_chain_call: bool,
}

/// A vote on an inbound event, as posted to the central chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundVote {
    /// Source chain of the event.
    pub chain_id: ChainId,
    /// Height (checkpoint) the source transaction was finalized at.
    pub observed_height: u64,
    /// The event being voted on.
    pub inbound: CanonicalInbound,
}

impl InboundVote {
    /// Builds the vote for an inbound observed on `chain_id`.
    pub fn new(
        chain_id: ChainId,
        observed_height: u64,
        inbound: CanonicalInbound,
    ) -> Self {
        Self {
            chain_id,
            observed_height,
            inbound,
        }
    }

    /// A vote is well formed when it identifies its transaction and both parties.
    pub fn is_well_formed(&self) -> bool {
        !self.inbound.source_tx_hash.is_empty()
            && !self.inbound.sender.is_empty()
            && !self.inbound.receiver.is_empty()
    }
}

/// An inbound tracker: a hint, posted by anyone, that a source transaction
/// contains an inbound the committee may have missed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundTracker {
    /// Source chain.
    pub chain_id: ChainId,
    /// Source transaction hash.
    pub tx_hash: String,
}
