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


use std::sync::Arc;

use tokio::sync::broadcast;
use xrelay_types::{
    BallotId, CentralBlock, ChainId, InboundTracker, InboundVote,
    OutboundIntent, OutboundTracker, OutboundVote, TxHandle,
};
use xrelay_utils::Result;

/// The central coordinating chain.
///
/// Ballot counting and consensus happen there; the relay client only posts
/// its observations and reads back what was decided.
#[async_trait::async_trait]
pub trait CentralChain: Send + Sync {
    /// Votes on an inbound event observed on a connected chain.
    async fn post_vote_inbound(&self, vote: &InboundVote) -> Result<BallotId>;
    /// Votes on the outcome of an outbound.
    async fn post_vote_outbound(&self, vote: &OutboundVote)
        -> Result<BallotId>;
    /// Reports the destination transaction that consumed `nonce`.
    async fn post_outbound_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx: &TxHandle,
    ) -> Result<()>;
    /// Outbounds decided but not yet finalized for `chain_id`, lowest nonce first.
    async fn list_pending_outbound(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutboundIntent>>;
    /// Inbound trackers reported for `chain_id`.
    async fn list_inbound_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<InboundTracker>>;
    /// Outbound trackers reported for `chain_id`.
    async fn list_outbound_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutboundTracker>>;
    /// Height of the latest central block.
    async fn latest_height(&self) -> Result<u64>;
    /// New-block notifications.
    fn subscribe_blocks(&self) -> broadcast::Receiver<CentralBlock>;
}

#[async_trait::async_trait]
impl<T> CentralChain for Arc<T>
where
    T: CentralChain + ?Sized,
{
    async fn post_vote_inbound(&self, vote: &InboundVote) -> Result<BallotId> {
        T::post_vote_inbound(self, vote).await
    }

    async fn post_vote_outbound(
        &self,
        vote: &OutboundVote,
    ) -> Result<BallotId> {
        T::post_vote_outbound(self, vote).await
    }

    async fn post_outbound_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx: &TxHandle,
    ) -> Result<()> {
        T::post_outbound_tracker(self, chain_id, nonce, tx).await
    }

    async fn list_pending_outbound(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutboundIntent>> {
        T::list_pending_outbound(self, chain_id).await
    }

    async fn list_inbound_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<InboundTracker>> {
        T::list_inbound_trackers(self, chain_id).await
    }

    async fn list_outbound_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutboundTracker>> {
        T::list_outbound_trackers(self, chain_id).await
    }

    async fn latest_height(&self) -> Result<u64> {
        T::latest_height(self).await
    }

    fn subscribe_blocks(&self) -> broadcast::Receiver<CentralBlock> {
        T::subscribe_blocks(self)
    }
}
