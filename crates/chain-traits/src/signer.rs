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


use std::fmt::Debug;

use xrelay_types::{
    CapabilityHandle, ChainId, Digest, FailureKind, OutboundIntent, Signature,
    TxHandle, TxStatus,
};
use xrelay_utils::Result;

/// Builds, broadcasts and follows outbound transactions on a connected chain.
///
/// Building must be deterministic: every committee member has to end up
/// signing the same bytes for the same intent.
#[async_trait::async_trait]
pub trait ChainSigner: Send + Sync {
    /// An unsigned transaction.
    type Tx: Debug + Clone + Send + Sync;

    /// The chain this signer writes to.
    fn chain_id(&self) -> ChainId;

    /// Checks the receiver chain, coin type and protocol version of `intent`.
    fn validate(&self, intent: &OutboundIntent) -> Result<()>;

    /// Whether `address` is a valid recipient on this chain.
    fn is_valid_recipient(&self, address: &str) -> bool;

    /// Whether building `intent` needs a capability handle.
    fn requires_capability(&self, intent: &OutboundIntent) -> bool;

    /// Fetches the id of the capability handle owned by the TSS address.
    async fn fetch_capability(&self) -> Result<String>;

    /// Builds the withdrawal of `intent`, paying `receiver`.
    async fn build_withdrawal(
        &self,
        intent: &OutboundIntent,
        receiver: &str,
        capability: Option<&CapabilityHandle>,
    ) -> Result<Self::Tx>;

    /// Builds a transaction that only consumes the nonce of `intent`.
    async fn build_cancel(
        &self,
        intent: &OutboundIntent,
        capability: Option<&CapabilityHandle>,
        gas_budget: u64,
    ) -> Result<Self::Tx>;

    /// The digest the TSS signs for `tx`.
    fn signing_digest(&self, tx: &Self::Tx) -> Result<Digest>;

    /// Submits the signed `tx`.
    async fn broadcast(
        &self,
        tx: &Self::Tx,
        signature: &Signature,
    ) -> Result<TxHandle>;

    /// The execution status of `tx`.
    async fn transaction_status(&self, tx: &TxHandle) -> Result<TxStatus>;

    /// Tells retryable execution errors from the ones that require a
    /// cancellation.
    fn classify_failure(&self, error: &str) -> FailureKind;

    /// The next outbound nonce the destination chain expects.
    async fn next_nonce(&self) -> Result<u64>;
}
