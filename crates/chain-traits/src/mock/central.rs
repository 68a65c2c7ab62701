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


use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use xrelay_types::{
    BallotId, CentralBlock, ChainId, InboundTracker, InboundVote,
    OutboundIntent, OutboundTracker, OutboundVote, TxHandle,
};
use xrelay_utils::{Error, Result};

use crate::CentralChain;

/// A central chain that records every vote and tracker.
#[derive(Debug)]
pub struct MockCentralChain {
    inbound_votes: Mutex<Vec<InboundVote>>,
    outbound_votes: Mutex<Vec<OutboundVote>>,
    trackers: Mutex<Vec<(ChainId, u64, TxHandle)>>,
    pending: Mutex<Vec<OutboundIntent>>,
    inbound_trackers: Mutex<Vec<InboundTracker>>,
    outbound_trackers: Mutex<Vec<OutboundTracker>>,
    vote_failures: Mutex<VecDeque<String>>,
    pending_queries: AtomicUsize,
    height: AtomicU64,
    blocks: broadcast::Sender<CentralBlock>,
}

impl Default for MockCentralChain {
    fn default() -> Self {
        let (blocks, _) = broadcast::channel(16);
        Self {
            inbound_votes: Default::default(),
            outbound_votes: Default::default(),
            trackers: Default::default(),
            pending: Default::default(),
            inbound_trackers: Default::default(),
            outbound_trackers: Default::default(),
            vote_failures: Default::default(),
            pending_queries: Default::default(),
            height: Default::default(),
            blocks,
        }
    }
}

impl MockCentralChain {
    /// Replaces the pending outbounds.
    pub fn set_pending(&self, intents: Vec<OutboundIntent>) {
        *self.pending.lock() = intents;
    }

    /// Adds an inbound tracker.
    pub fn push_inbound_tracker(&self, tracker: InboundTracker) {
        self.inbound_trackers.lock().push(tracker);
    }

    /// Adds an outbound tracker.
    pub fn push_outbound_tracker(&self, tracker: OutboundTracker) {
        self.outbound_trackers.lock().push(tracker);
    }

    /// Makes the next vote (inbound or outbound) fail with `reason`.
    pub fn fail_next_vote(&self, reason: impl Into<String>) {
        self.vote_failures.lock().push_back(reason.into());
    }

    /// Publishes a new central block.
    pub fn publish_block(&self, height: u64) {
        self.set_height(height);
        self.announce_block(height);
    }

    /// Moves the chain head without announcing a block.
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Announces a block without moving the chain head.
    pub fn announce_block(&self, height: u64) {
        let _ = self.blocks.send(CentralBlock::new(height));
    }

    /// Inbound votes posted so far.
    pub fn inbound_votes(&self) -> Vec<InboundVote> {
        self.inbound_votes.lock().clone()
    }

    /// Outbound votes posted so far.
    pub fn outbound_votes(&self) -> Vec<OutboundVote> {
        self.outbound_votes.lock().clone()
    }

    /// Outbound trackers posted so far.
    pub fn posted_trackers(&self) -> Vec<(ChainId, u64, TxHandle)> {
        self.trackers.lock().clone()
    }

    /// How many times the pending outbounds were listed.
    pub fn pending_queries(&self) -> usize {
        self.pending_queries.load(Ordering::SeqCst)
    }

    fn next_vote_failure(&self) -> Result<()> {
        match self.vote_failures.lock().pop_front() {
            Some(reason) => Err(Error::Rpc(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl CentralChain for MockCentralChain {
    async fn post_vote_inbound(&self, vote: &InboundVote) -> Result<BallotId> {
        self.next_vote_failure()?;
        self.inbound_votes.lock().push(vote.clone());
        Ok(format!(
            "{}-{}-{}",
            vote.chain_id, vote.inbound.source_tx_hash, vote.inbound.event_index
        ))
    }

    async fn post_vote_outbound(
        &self,
        vote: &OutboundVote,
    ) -> Result<BallotId> {
        self.next_vote_failure()?;
        self.outbound_votes.lock().push(vote.clone());
        Ok(format!("{}-{}", vote.chain_id, vote.nonce))
    }

    async fn post_outbound_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx: &TxHandle,
    ) -> Result<()> {
        self.trackers.lock().push((chain_id, nonce, tx.clone()));
        Ok(())
    }

    async fn list_pending_outbound(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutboundIntent>> {
        self.pending_queries.fetch_add(1, Ordering::SeqCst);
        let mut intents = self
            .pending
            .lock()
            .iter()
            .filter(|i| i.receiver_chain_id == chain_id)
            .cloned()
            .collect::<Vec<_>>();
        intents.sort_by_key(|i| i.nonce);
        Ok(intents)
    }

    async fn list_inbound_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<InboundTracker>> {
        Ok(self
            .inbound_trackers
            .lock()
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn list_outbound_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutboundTracker>> {
        Ok(self
            .outbound_trackers
            .lock()
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn latest_height(&self) -> Result<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    fn subscribe_blocks(&self) -> broadcast::Receiver<CentralBlock> {
        self.blocks.subscribe()
    }
}
