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
//! # Outbound Signer ✍️
//!
//! One [`Signer`] per connected chain. [`Signer::process_outbound`] drives a
//! single outbound intent from the central chain to a confirmed transaction
//! on the destination chain:
//!
//! ```text
//! validate -> build -> sign -> broadcast -> track -> report
//!                                             |
//!                                             +-> (non-retryable) cancel -> track -> report
//! ```
//!
//! The last known state of every nonce lives in the [`OutboundCache`] shared
//! with the observer of the same chain, so a later invocation resumes where
//! the previous one stopped instead of signing again.

use std::collections::HashSet;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use typed_builder::TypedBuilder;
use xrelay_cache::{CapabilityCache, OutboundCache};
use xrelay_chain_traits::{CentralChain, ChainSigner, ComplianceChecker};
use xrelay_config::OutboundConfig;
use xrelay_tss::{RateLimitedSigner, SigningClient};
use xrelay_types::{ChainId, Digest, Signature};
use xrelay_utils::clock::SharedClock;
use xrelay_utils::metric::Metrics;

mod guard;
mod process;
mod track;

use guard::InFlight;

/// Signs, broadcasts and tracks the outbounds of one chain.
#[derive(TypedBuilder)]
pub struct Signer<S, C> {
    /// The destination chain.
    chain: Arc<S>,
    /// Signing service, behind the shared rate limiter.
    tss: RateLimitedSigner<C>,
    /// Where trackers are posted.
    central: Arc<dyn CentralChain>,
    /// Capability handle of the chain, if it needs one.
    capability: CapabilityCache,
    /// Screens receivers before anything is paid out.
    compliance: Arc<dyn ComplianceChecker>,
    /// Outbound states shared with the observer.
    #[builder(default)]
    outbound_cache: Arc<OutboundCache>,
    /// Time source of the confirmation loop.
    clock: SharedClock,
    /// Confirmation and cancellation settings.
    #[builder(default)]
    config: OutboundConfig,
    /// Withdrawals to an invalid recipient are paid here instead.
    #[builder(default)]
    custody_address: Option<String>,
    /// Sign but never broadcast.
    #[builder(default)]
    dry_mode: bool,
    /// Relayer metrics.
    metrics: Arc<tokio::sync::Mutex<Metrics>>,
    #[builder(default, setter(skip))]
    in_flight: Arc<Mutex<HashSet<u64>>>,
    /// The last signature obtained for each nonce, with its digest. Holds
    /// no more nonces than the outbound cache.
    #[builder(default = Mutex::new(LruCache::unbounded()), setter(skip))]
    signatures: Mutex<LruCache<u64, (Digest, Signature)>>,
}

impl<S, C> Signer<S, C>
where
    S: ChainSigner,
    C: SigningClient,
{
    /// The chain this signer writes to.
    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    /// Whether an invocation of [`process_outbound`](Self::process_outbound)
    /// is currently working on `nonce`.
    pub fn is_outbound_active(&self, nonce: u64) -> bool {
        self.in_flight.lock().contains(&nonce)
    }

    /// The next outbound nonce the destination chain expects.
    pub async fn next_nonce(&self) -> xrelay_utils::Result<u64> {
        self.chain.next_nonce().await
    }

    /// The chain's capability cache.
    pub fn capability_cache(&self) -> &CapabilityCache {
        &self.capability
    }

    /// The outbound cache shared with the observer.
    pub fn outbound_cache(&self) -> &Arc<OutboundCache> {
        &self.outbound_cache
    }

    /// Drops the signature kept for `nonce`, once nothing will sign for it
    /// again.
    pub fn forget_signature(&self, nonce: u64) {
        self.signatures.lock().pop(&nonce);
    }

    fn enter(&self, nonce: u64) -> xrelay_utils::Result<InFlight> {
        InFlight::enter(self.in_flight.clone(), self.chain.chain_id(), nonce)
    }
}

impl<S, C> std::fmt::Debug for Signer<S, C>
where
    S: ChainSigner,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("chain_id", &self.chain.chain_id())
            .field("dry_mode", &self.dry_mode)
            .finish()
    }
}
