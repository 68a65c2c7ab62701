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


use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::ChainId;

/// The kind of value an outbound moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinType {
    /// The destination chain's native gas coin.
    Gas,
    /// A token identified by the intent's `asset`.
    Token,
    /// A call without any value attached.
    NoAssetCall,
}

/// An outbound transfer the central chain decided must happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundIntent {
    /// Outbound sequence number on the destination chain.
    pub nonce: u64,
    /// Destination chain.
    pub receiver_chain_id: ChainId,
    /// Recipient address on the destination chain.
    pub receiver: String,
    /// Amount to transfer, in the asset's smallest unit.
    pub amount: u128,
    /// Kind of value transferred.
    pub coin_type: CoinType,
    /// Asset identifier (empty for the gas coin).
    pub asset: String,
    /// Gas budget paid for by the intent.
    pub gas_budget: u64,
    /// Version of the gateway protocol the intent was created for.
    pub protocol_version: u32,
    /// Optional call payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl OutboundIntent {
    /// A human readable identifier, unique per `(chain, nonce)`.
    pub fn outbound_id(&self) -> String {
        format!("{}-{}", self.receiver_chain_id, self.nonce)
    }
}

/// Identifier of a broadcast destination-chain transaction.
#[derive(
    Debug,
    Display,
    From,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct TxHandle(pub String);

impl From<&str> for TxHandle {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// What the destination chain currently says about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not indexed yet.
    NotFound,
    /// Known but not yet executed with a final status.
    Pending,
    /// Executed successfully.
    Success,
    /// Executed and rejected with the given execution error.
    Failed(String),
    /// Executed as a nonce-only cancellation: the nonce is consumed but
    /// nothing was transferred.
    Cancelled,
}

impl TxStatus {
    /// Whether the destination chain will not change its answer anymore.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Success | Self::Failed(_) | Self::Cancelled)
    }
}

/// Classification of a post-broadcast execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The same signed intent may succeed later (nonce ordering, inactive
    /// capability, allowlist race).
    Retryable,
    /// Anything else; the nonce must be consumed by a cancellation.
    NonRetryable,
}

/// Lifecycle of one outbound attempt.
///
/// `Built → Signed → Broadcast → Tracking → {Confirmed | Failed | TimedOut}`,
/// or `Invalid` straight away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum OutboundState {
    /// The unsigned transaction was built.
    Built,
    /// A signature was obtained.
    Signed,
    /// The transaction was accepted by the destination node.
    Broadcast,
    /// Waiting for a terminal execution status.
    Tracking,
    /// Executed successfully and reported.
    Confirmed,
    /// Rejected by the destination chain.
    Failed {
        /// Whether the same nonce may be retried.
        retryable: bool,
    },
    /// No terminal status before the hard timeout.
    TimedOut,
    /// The intent did not pass validation.
    Invalid,
}

impl OutboundState {
    /// Whether the attempt is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Failed { .. } | Self::TimedOut | Self::Invalid
        )
    }
}

/// The last known state of an outbound nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedOutbound {
    /// Outbound nonce.
    pub nonce: u64,
    /// Destination transaction, once one was broadcast.
    pub tx_handle: Option<TxHandle>,
    /// Current state.
    pub state: OutboundState,
    /// `tx_handle` is a nonce-only cancellation, not the withdrawal.
    #[serde(default)]
    pub is_cancel: bool,
}

impl TrackedOutbound {
    /// Creates a record without a transaction.
    pub fn new(nonce: u64, state: OutboundState) -> Self {
        Self {
            nonce,
            tx_handle: None,
            state,
            is_cancel: false,
        }
    }

    /// Creates a record for a broadcast transaction.
    pub fn with_tx(nonce: u64, tx: TxHandle, state: OutboundState) -> Self {
        Self {
            nonce,
            tx_handle: Some(tx),
            state,
            is_cancel: false,
        }
    }

    /// Creates a record for a broadcast cancellation.
    pub fn cancellation(nonce: u64, tx: TxHandle, state: OutboundState) -> Self {
        Self {
            nonce,
            tx_handle: Some(tx),
            state,
            is_cancel: true,
        }
    }
}

/// An outbound tracker as stored on the central chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTracker {
    /// Destination chain.
    pub chain_id: ChainId,
    /// Outbound nonce.
    pub nonce: u64,
    /// Destination transactions reported for this nonce.
    pub tx_hashes: Vec<TxHandle>,
}

/// A vote on the outcome of an outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundVote {
    /// Destination chain.
    pub chain_id: ChainId,
    /// Outbound nonce.
    pub nonce: u64,
    /// Destination transaction that consumed the nonce.
    pub tx: TxHandle,
    /// Whether the transfer itself went through.
    pub success: bool,
}
