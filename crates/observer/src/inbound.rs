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

use xrelay_chain_traits::{ChainObserver, Located};
use xrelay_store::CursorStore;
use xrelay_types::{CanonicalInbound, ChainId, Cursor, InboundTracker, InboundVote};
use xrelay_utils::probe;
use xrelay_utils::retry::{retry_transient, ConstantWithMaxRetryCount};
use xrelay_utils::Result;

use crate::Observer;

/// What happened to a single inbound item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Voted,
    Skipped,
    VoteFailed,
    /// The item is not final yet; nothing after it may be processed.
    Halted,
}

impl<C, S> Observer<C, S>
where
    C: ChainObserver,
    S: CursorStore,
{
    /// Scans the chain for new inbound events and votes on them.
    ///
    /// At most `max-items-per-scan` items after the persisted cursor are
    /// handled, oldest first. The cursor is persisted after every item,
    /// including skipped ones, and the scan stops on the first item whose
    /// source transaction is not finalized yet.
    #[tracing::instrument(skip_all, fields(chain_id = %self.chain.chain_id()))]
    pub async fn observe_inbound(&self) -> Result<()> {
        let chain_id = self.chain.chain_id();
        let mut cursor = self.load_cursor(chain_id).await?;
        let items = self
            .chain
            .fetch_inbound(&cursor, self.config.max_items_per_scan)
            .await?;
        tracing::trace!(after = %cursor, count = items.len(), "Fetched inbound items");

        for item in &items {
            if self.process_item(item).await == ItemOutcome::Halted {
                break;
            }
            let next = self.chain.cursor_of(item);
            self.store.set_cursor(chain_id, &next)?;
            cursor = next;
        }

        self.report_sync(chain_id, &cursor).await;
        Ok(())
    }

    /// Votes on the inbounds of transactions somebody asked the committee
    /// to look at again.
    ///
    /// Posted trackers come first, then the transactions whose vote failed
    /// here earlier. A failing tracker is logged and the scan moves on to
    /// the next one.
    #[tracing::instrument(skip_all, fields(chain_id = %self.chain.chain_id()))]
    pub async fn process_inbound_trackers(&self) -> Result<()> {
        let chain_id = self.chain.chain_id();
        let mut trackers = self.central.list_inbound_trackers(chain_id).await?;
        for tracker in self.internal_trackers() {
            if !trackers.iter().any(|t| t.tx_hash == tracker.tx_hash) {
                trackers.push(tracker);
            }
        }
        let limit = self.config.max_trackers_per_scan;
        if trackers.len() > limit {
            tracing::debug!(
                total = trackers.len(),
                limit,
                "Too many inbound trackers, handling the oldest ones"
            );
            trackers.truncate(limit);
        }

        for tracker in &trackers {
            if let Err(e) = self.process_inbound_tracker(tracker).await {
                tracing::warn!(
                    tx = %tracker.tx_hash,
                    error = %e,
                    "Failed to process inbound tracker"
                );
            }
        }
        Ok(())
    }

    async fn process_inbound_tracker(
        &self,
        tracker: &InboundTracker,
    ) -> Result<()> {
        let items = self.chain.transaction_events(&tracker.tx_hash).await?;
        if items.is_empty() {
            tracing::debug!(tx = %tracker.tx_hash, "No inbound event in tracked transaction");
        }
        let mut settled = true;
        for item in &items {
            match self.process_item(item).await {
                ItemOutcome::Voted | ItemOutcome::Skipped => {}
                ItemOutcome::VoteFailed => settled = false,
                ItemOutcome::Halted => {
                    settled = false;
                    break;
                }
            }
        }
        if settled && self.internal_trackers.lock().pop(&tracker.tx_hash).is_some() {
            tracing::debug!(tx = %tracker.tx_hash, "Inbound retried successfully");
        }
        Ok(())
    }

    async fn load_cursor(&self, chain_id: ChainId) -> Result<Cursor> {
        if let Some(cursor) = self.store.get_cursor(chain_id)? {
            return Ok(cursor);
        }
        let cursor = match self.config.scan_from {
            Some(position) => Cursor::new(position, ""),
            None => self.chain.earliest_cursor().await?,
        };
        self.store.set_cursor(chain_id, &cursor)?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            %chain_id,
            bootstrap = true,
            cursor = %cursor,
        );
        Ok(cursor)
    }

    async fn report_sync(&self, chain_id: ChainId, cursor: &Cursor) {
        let latest = match self.chain.latest_position().await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query the latest position");
                return;
            }
        };
        if let Err(e) = self.store.set_target_position(chain_id, latest) {
            tracing::warn!(error = %e, "Failed to persist the target position");
        }
        let behind = latest.saturating_sub(cursor.position);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            %chain_id,
            cursor = cursor.position,
            latest,
            behind,
            synced = behind == 0,
        );
    }

    pub(crate) async fn process_item(&self, item: &C::Item) -> ItemOutcome {
        let chain_id = self.chain.chain_id();
        let inbound = match self.chain.parse(item) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(?item, error = %e, "Dropping unparseable inbound item");
                self.metrics.lock().await.inbound_items_unparseable.inc();
                return ItemOutcome::Skipped;
            }
        };

        let height = match self.chain.locate(&inbound).await {
            Ok(Located::Finalized { height }) => height,
            Ok(located) => {
                tracing::debug!(
                    tx = %inbound.source_tx_hash,
                    ?located,
                    "Source transaction not final yet, halting"
                );
                self.metrics.lock().await.inbound_scan_halts.inc();
                return ItemOutcome::Halted;
            }
            Err(e) => {
                tracing::warn!(
                    tx = %inbound.source_tx_hash,
                    error = %e,
                    "Unable to locate source transaction, halting"
                );
                self.metrics.lock().await.inbound_scan_halts.inc();
                return ItemOutcome::Halted;
            }
        };

        if let Some(address) = self.restricted_party(&inbound) {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::INFO,
                kind = %probe::Kind::Compliance,
                %chain_id,
                tx = %inbound.source_tx_hash,
                event_index = inbound.event_index,
                address,
            );
            self.metrics.lock().await.compliance_skips.inc();
            return ItemOutcome::Skipped;
        }

        let vote = InboundVote::new(chain_id, height, inbound);
        if !vote.is_well_formed() {
            tracing::warn!(?vote, "Dropping malformed inbound");
            self.metrics.lock().await.inbound_items_unparseable.inc();
            return ItemOutcome::Skipped;
        }
        self.post_inbound_vote(&vote).await
    }

    fn restricted_party<'a>(
        &self,
        inbound: &'a CanonicalInbound,
    ) -> Option<&'a str> {
        [inbound.sender.as_str(), inbound.receiver.as_str()]
            .into_iter()
            .find(|address| self.compliance.is_restricted(address))
    }

    async fn post_inbound_vote(&self, vote: &InboundVote) -> ItemOutcome {
        let backoff = ConstantWithMaxRetryCount::new(
            Duration::from_millis(self.config.vote_retry_interval),
            self.config.vote_max_retries,
        );
        let result = retry_transient("post_vote_inbound", backoff, || {
            self.central.post_vote_inbound(vote)
        })
        .await;
        match result {
            Ok(ballot) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Inbound,
                    chain_id = %vote.chain_id,
                    tx = %vote.inbound.source_tx_hash,
                    event_index = vote.inbound.event_index,
                    %ballot,
                    voted = true,
                );
                self.metrics.lock().await.inbound_votes_posted.inc();
                ItemOutcome::Voted
            }
            Err(e) => {
                tracing::error!(
                    tx = %vote.inbound.source_tx_hash,
                    event_index = vote.inbound.event_index,
                    error = %e,
                    "Giving up on inbound vote"
                );
                self.metrics.lock().await.inbound_vote_failures.inc();
                self.internal_trackers.lock().put(
                    vote.inbound.source_tx_hash.clone(),
                    InboundTracker {
                        chain_id: vote.chain_id,
                        tx_hash: vote.inbound.source_tx_hash.clone(),
                    },
                );
                ItemOutcome::VoteFailed
            }
        }
    }
}
