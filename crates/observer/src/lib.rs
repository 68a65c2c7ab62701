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
//! # Inbound Observer 🔭
//!
//! One [`Observer`] per connected chain. It scans the chain's gateway events
//! after a persisted cursor and turns them into inbound votes on the central
//! chain, and it settles inbound and outbound trackers posted by others.
//!
//! Every entry point is a single tick: it does a bounded amount of work and
//! returns, the scheduler decides when the next tick runs.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use typed_builder::TypedBuilder;
use xrelay_cache::OutboundCache;
use xrelay_chain_traits::{CentralChain, ChainObserver, ComplianceChecker};
use xrelay_config::InboundConfig;
use xrelay_store::CursorStore;
use xrelay_types::{ChainId, InboundTracker};
use xrelay_utils::metric::Metrics;

mod inbound;
mod outbound;

/// How many failed inbound votes are remembered for a retry.
pub const MAX_INTERNAL_TRACKERS: usize = 500;

/// Turns the events of one chain into votes on the central chain.
#[derive(TypedBuilder)]
pub struct Observer<C, S> {
    /// The chain being observed.
    chain: Arc<C>,
    /// Where votes are posted.
    central: Arc<dyn CentralChain>,
    /// Persists the scanning position.
    store: S,
    /// Screens senders and receivers.
    compliance: Arc<dyn ComplianceChecker>,
    /// Outbound states shared with the signer of the same chain.
    #[builder(default)]
    outbound_cache: Arc<OutboundCache>,
    /// Scanning limits and retries.
    #[builder(default)]
    config: InboundConfig,
    /// Relayer metrics.
    metrics: Arc<Mutex<Metrics>>,
    /// Source transactions whose inbound vote failed, keyed by hash. They
    /// are retried with the inbound trackers until a vote goes through.
    #[builder(
        default = parking_lot::Mutex::new(LruCache::new(
            NonZeroUsize::new(MAX_INTERNAL_TRACKERS).unwrap_or(NonZeroUsize::MIN),
        )),
        setter(skip)
    )]
    internal_trackers: parking_lot::Mutex<LruCache<String, InboundTracker>>,
}

impl<C, S> Observer<C, S>
where
    C: ChainObserver,
    S: CursorStore,
{
    /// The chain this observer reads.
    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    /// The inbound settings in use.
    pub fn config(&self) -> &InboundConfig {
        &self.config
    }

    /// The outbound cache shared with the signer.
    pub fn outbound_cache(&self) -> &Arc<OutboundCache> {
        &self.outbound_cache
    }

    /// Source transactions waiting for another inbound vote, oldest first.
    pub fn internal_trackers(&self) -> Vec<InboundTracker> {
        self.internal_trackers
            .lock()
            .iter()
            .rev()
            .map(|(_, tracker)| tracker.clone())
            .collect()
    }
}

impl<C, S> std::fmt::Debug for Observer<C, S>
where
    C: ChainObserver,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("chain_id", &self.chain.chain_id())
            .finish()
    }
}

#[cfg(test)]
mod tests;
