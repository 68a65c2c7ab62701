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


use std::time::Duration;

use xrelay_chain_traits::ChainObserver;
use xrelay_store::CursorStore;
use xrelay_types::{
    OutboundState, OutboundTracker, OutboundVote, TrackedOutbound, TxHandle,
    TxStatus,
};
use xrelay_utils::probe;
use xrelay_utils::retry::{retry_transient, ConstantWithMaxRetryCount};
use xrelay_utils::Result;

use crate::Observer;

impl<C, S> Observer<C, S>
where
    C: ChainObserver,
    S: CursorStore,
{
    /// Votes on the outcome of every outbound tracker of this chain whose
    /// transaction reached a final state.
    #[tracing::instrument(skip_all, fields(chain_id = %self.chain.chain_id()))]
    pub async fn process_outbound_trackers(&self) -> Result<()> {
        let chain_id = self.chain.chain_id();
        let trackers = self.central.list_outbound_trackers(chain_id).await?;
        for tracker in &trackers {
            if let Err(e) = self.process_outbound_tracker(tracker).await {
                tracing::warn!(
                    nonce = tracker.nonce,
                    error = %e,
                    "Failed to process outbound tracker"
                );
            }
        }
        Ok(())
    }

    /// Votes on an outbound whose nonce was already consumed on the
    /// destination chain.
    ///
    /// The outcome comes from the outbound cache when this relayer handled
    /// the outbound itself, otherwise from the trackers posted for it.
    /// Returns `true` when a vote was posted.
    #[tracing::instrument(skip(self), fields(chain_id = %self.chain.chain_id()))]
    pub async fn vote_outbound_if_confirmed(&self, nonce: u64) -> Result<bool> {
        if let Some(tracked) = self.outbound_cache.get(nonce) {
            if let (Some(tx), Some(success)) =
                (tracked.tx_handle.as_ref(), settled(&tracked.state))
            {
                self.vote_outbound(nonce, tx, success).await?;
                return Ok(true);
            }
        }

        let trackers = self
            .central
            .list_outbound_trackers(self.chain.chain_id())
            .await?;
        match trackers.iter().find(|t| t.nonce == nonce) {
            Some(tracker) => self.process_outbound_tracker(tracker).await,
            None => {
                tracing::debug!(nonce, "No tracker for consumed nonce yet");
                Ok(false)
            }
        }
    }

    async fn process_outbound_tracker(
        &self,
        tracker: &OutboundTracker,
    ) -> Result<bool> {
        for tx in &tracker.tx_hashes {
            if let Some(success) = self.outbound_outcome(tracker.nonce, tx).await? {
                self.vote_outbound(tracker.nonce, tx, success).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `Some(success)` once `tx` settled the nonce, `None` while it did not.
    async fn outbound_outcome(
        &self,
        nonce: u64,
        tx: &TxHandle,
    ) -> Result<Option<bool>> {
        if let Some(tracked) = self.outbound_cache.get(nonce) {
            if tracked.tx_handle.as_ref() == Some(tx) {
                if let Some(success) = settled(&tracked.state) {
                    return Ok(Some(success));
                }
            }
        }

        let outcome = match self.chain.transaction_status(tx).await? {
            TxStatus::Success => Some(true),
            TxStatus::Cancelled => Some(false),
            // a failed execution leaves the nonce pending
            TxStatus::Failed(reason) => {
                tracing::debug!(nonce, %tx, %reason, "Tracked outbound failed");
                None
            }
            TxStatus::Pending | TxStatus::NotFound => None,
        };
        if let Some(success) = outcome {
            let state = if success {
                OutboundState::Confirmed
            } else {
                OutboundState::Failed { retryable: false }
            };
            self.outbound_cache
                .put(TrackedOutbound::with_tx(nonce, tx.clone(), state));
        }
        Ok(outcome)
    }

    async fn vote_outbound(
        &self,
        nonce: u64,
        tx: &TxHandle,
        success: bool,
    ) -> Result<()> {
        let vote = OutboundVote {
            chain_id: self.chain.chain_id(),
            nonce,
            tx: tx.clone(),
            success,
        };
        let backoff = ConstantWithMaxRetryCount::new(
            Duration::from_millis(self.config.vote_retry_interval),
            self.config.vote_max_retries,
        );
        let ballot = retry_transient("post_vote_outbound", backoff, || {
            self.central.post_vote_outbound(&vote)
        })
        .await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Tracker,
            chain_id = %vote.chain_id,
            nonce,
            %tx,
            success,
            %ballot,
        );
        self.metrics.lock().await.outbound_votes_posted.inc();
        Ok(())
    }
}

fn settled(state: &OutboundState) -> Option<bool> {
    match state {
        OutboundState::Confirmed => Some(true),
        OutboundState::Failed { retryable: false } => Some(false),
        _ => None,
    }
}
