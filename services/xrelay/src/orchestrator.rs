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


//! Starts and stops the task groups of every connected chain.
//!
//! The [`Orchestrator`] owns the [`Scheduler`]. It registers two core tasks:
//!
//! * `update_context` re-reads the configuration directory and swaps the
//!   configuration snapshot.
//! * `sync_chains` compares the enabled chains of the snapshot with the
//!   running groups, starts a group for every new chain and stops the groups
//!   of removed chains.
//!
//! A chain group is made of four tasks sharing one [`Observer`] and one
//! [`Signer`]:
//!
//! | task                        | trigger        | skipped when            |
//! |-----------------------------|----------------|-------------------------|
//! | `observe_inbound`           | inbound ticker | inbound disabled        |
//! | `process_inbound_trackers`  | inbound ticker | inbound disabled        |
//! | `process_outbound_trackers` | outbound ticker| outbound disabled       |
//! | `schedule_outbound`         | central blocks | outbound disabled       |

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use xrelay_cache::{CapabilityCache, OutboundCache};
use xrelay_chain_traits::{
    CentralChain, ChainObserver, ChainSigner, RestrictedAddressList,
};
use xrelay_config::ChainConfig;
use xrelay_context::RelayerContext;
use xrelay_observer::Observer;
use xrelay_scheduler::{
    IntervalFn, Scheduler, Skipper, TaskContext, TaskOptions, Trigger,
};
use xrelay_signer::Signer;
use xrelay_store::SledStore;
use xrelay_tss::{RateLimitedSigner, RateLimiter, SigningClient};
use xrelay_types::{ChainId, OutboundIntent};
use xrelay_utils::clock::{SharedClock, SystemClock};
use xrelay_utils::{probe, Error, Result};

/// Group of the tasks that are not tied to a chain.
pub const CORE_GROUP: &str = "core";

const CHAIN_GROUP_PREFIX: &str = "chain-";

/// Name of the task group of `chain_id`.
pub fn chain_group(chain_id: ChainId) -> String {
    format!("{CHAIN_GROUP_PREFIX}{chain_id}")
}

fn group_chain_id(group: &str) -> Option<ChainId> {
    group
        .strip_prefix(CHAIN_GROUP_PREFIX)?
        .parse::<i64>()
        .ok()
        .map(ChainId)
}

/// The clients of one connected chain.
#[derive(Debug)]
pub struct ChainClients<O, S> {
    /// Reads events and transaction results.
    pub observer: Arc<O>,
    /// Builds and broadcasts outbound transactions.
    pub signer: Arc<S>,
}

impl<O, S> Clone for ChainClients<O, S> {
    fn clone(&self) -> Self {
        Self {
            observer: self.observer.clone(),
            signer: self.signer.clone(),
        }
    }
}

/// Connects to a chain described by the configuration.
#[async_trait::async_trait]
pub trait ChainFactory: Send + Sync + 'static {
    /// The observer client of the chain.
    type Observer: ChainObserver + 'static;
    /// The signer client of the chain.
    type Signer: ChainSigner + 'static;

    /// Builds the clients of `config`.
    async fn connect(
        &self,
        config: &ChainConfig,
    ) -> Result<ChainClients<Self::Observer, Self::Signer>>;
}

type ChainObserverOf<F> = Observer<<F as ChainFactory>::Observer, SledStore>;
type ChainSignerOf<F> =
    Signer<<F as ChainFactory>::Signer, Arc<dyn SigningClient>>;

/// Wires the chains, the central chain and the signing service together.
pub struct Orchestrator<F> {
    ctx: RelayerContext,
    central: Arc<dyn CentralChain>,
    factory: Arc<F>,
    tss: Arc<dyn SigningClient>,
    limiter: Arc<RateLimiter>,
    clock: SharedClock,
    scheduler: Scheduler,
    config_dir: Option<PathBuf>,
}

impl<F> Clone for Orchestrator<F> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            central: self.central.clone(),
            factory: self.factory.clone(),
            tss: self.tss.clone(),
            limiter: self.limiter.clone(),
            clock: self.clock.clone(),
            scheduler: self.scheduler.clone(),
            config_dir: self.config_dir.clone(),
        }
    }
}

impl<F> std::fmt::Debug for Orchestrator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scheduler", &self.scheduler)
            .field("limiter", &self.limiter)
            .field("config_dir", &self.config_dir)
            .finish()
    }
}

impl<F> Orchestrator<F>
where
    F: ChainFactory,
{
    /// Creates an orchestrator; nothing runs before [`start`](Self::start).
    ///
    /// The signing rate limit is read from the configuration once, here.
    pub fn new(
        ctx: RelayerContext,
        central: Arc<dyn CentralChain>,
        factory: Arc<F>,
        tss: Arc<dyn SigningClient>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            ctx.config().tss.max_pending_signatures,
        ));
        let scheduler = Scheduler::new(ctx.metrics.clone());
        Self {
            ctx,
            central,
            factory,
            tss,
            limiter,
            clock: Arc::new(SystemClock),
            scheduler,
            config_dir: None,
        }
    }

    /// Uses `clock` for confirmation polling and capability expiry.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Reloads the configuration from `config_dir` on every
    /// `update_context` tick.
    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(config_dir.into());
        self
    }

    /// The scheduler driving every task.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The signing rate limiter shared by all chains.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Registers the core tasks. Chain groups are started by the first
    /// `sync_chains` tick, right away.
    ///
    /// The scheduler is stopped when the context's shutdown signal fires.
    pub fn start(&self) -> Result<()> {
        let ctx = self.ctx.clone();
        let this = self.clone();
        self.scheduler.register(
            TaskOptions::builder()
                .name("update_context")
                .group(CORE_GROUP)
                .trigger(Trigger::Dynamic(Arc::new(move || {
                    Duration::from_millis(
                        ctx.config().central.config_update_interval,
                    )
                })))
                .build(),
            move |_task| {
                let this = this.clone();
                async move { this.update_context() }
            },
        )?;

        let ctx = self.ctx.clone();
        let this = self.clone();
        self.scheduler.register(
            TaskOptions::builder()
                .name("sync_chains")
                .group(CORE_GROUP)
                .trigger(Trigger::Dynamic(Arc::new(move || {
                    ctx.config().central.sync_chains_interval()
                })))
                .build(),
            move |_task| {
                let this = this.clone();
                async move { this.sync_chains().await }
            },
        )?;

        let mut shutdown = self.ctx.shutdown_signal();
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            shutdown.recv().await;
            scheduler.stop();
        });

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            orchestrator = true,
            started = true,
        );
        Ok(())
    }

    /// Stops every task.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Swaps the configuration snapshot with a fresh read of the
    /// configuration directory, if there is one.
    pub fn update_context(&self) -> Result<()> {
        if let Some(dir) = &self.config_dir {
            self.ctx.reload_config(dir)?;
        }
        Ok(())
    }

    /// Starts the groups of newly enabled chains and stops the groups of
    /// chains that are no longer enabled.
    ///
    /// A chain that fails to start is retried on the next tick.
    #[tracing::instrument(skip_all)]
    pub async fn sync_chains(&self) -> Result<()> {
        let config = self.ctx.config();
        let wanted = config.enabled_chain_ids();
        let running = self.running_chains();

        for chain_id in running.difference(&wanted) {
            tracing::info!(%chain_id, "Chain is no longer enabled, stopping it");
            self.scheduler.stop_group(&chain_group(*chain_id));
        }

        let mut added = wanted.difference(&running).copied().collect::<Vec<_>>();
        added.sort();
        for chain_id in added {
            let Some(chain) = config.chain(chain_id) else {
                continue;
            };
            match self.start_chain(chain).await {
                Ok(()) => {
                    tracing::info!(%chain_id, name = %chain.name, "Chain started");
                }
                Err(e) => {
                    tracing::error!(%chain_id, error = %e, "Failed to start chain");
                    self.scheduler.stop_group(&chain_group(chain_id));
                }
            }
        }
        Ok(())
    }

    fn running_chains(&self) -> HashSet<ChainId> {
        self.scheduler
            .groups()
            .iter()
            .filter_map(|g| group_chain_id(g))
            .collect()
    }

    async fn start_chain(&self, config: &ChainConfig) -> Result<()> {
        let chain_id = config.chain_id;
        let group = chain_group(chain_id);
        let clients = self.factory.connect(config).await?;
        let metrics = self.ctx.metrics.clone();

        let outbound_cache =
            Arc::new(OutboundCache::new(config.outbound_cache_capacity));
        let compliance = Arc::new(RestrictedAddressList::new(
            &self.ctx.config().compliance.restricted_addresses,
        ));

        let observer: Arc<ChainObserverOf<F>> = Arc::new(
            Observer::builder()
                .chain(clients.observer)
                .central(self.central.clone())
                .store(self.ctx.store().clone())
                .compliance(compliance.clone())
                .outbound_cache(outbound_cache.clone())
                .config(config.inbound)
                .metrics(metrics.clone())
                .build(),
        );
        let signer: Arc<ChainSignerOf<F>> = Arc::new(
            Signer::builder()
                .chain(clients.signer)
                .tss(RateLimitedSigner::new(
                    self.tss.clone(),
                    self.limiter.clone(),
                    metrics.clone(),
                ))
                .central(self.central.clone())
                .capability(CapabilityCache::new(
                    Duration::from_millis(config.capability_ttl),
                    self.clock.clone(),
                ))
                .compliance(compliance)
                .outbound_cache(outbound_cache)
                .clock(self.clock.clone())
                .config(config.outbound)
                .custody_address(config.custody_address.clone())
                .dry_mode(config.dry_mode)
                .metrics(metrics)
                .build(),
        );

        let inbound_interval =
            self.interval_of(chain_id, |c| c.inbound.polling_interval);
        let inbound_skipper = self.skip_unless(chain_id, |c| c.inbound.enabled);
        let outbound_interval =
            self.interval_of(chain_id, |c| c.outbound.polling_interval);
        let outbound_skipper =
            self.skip_unless(chain_id, |c| c.outbound.enabled);

        let o = observer.clone();
        self.scheduler.register(
            TaskOptions::builder()
                .name("observe_inbound")
                .group(group.clone())
                .trigger(Trigger::Dynamic(inbound_interval.clone()))
                .skipper(inbound_skipper.clone())
                .build(),
            move |_task| {
                let o = o.clone();
                async move { o.observe_inbound().await }
            },
        )?;

        let o = observer.clone();
        self.scheduler.register(
            TaskOptions::builder()
                .name("process_inbound_trackers")
                .group(group.clone())
                .trigger(Trigger::Dynamic(inbound_interval))
                .skipper(inbound_skipper)
                .build(),
            move |_task| {
                let o = o.clone();
                async move { o.process_inbound_trackers().await }
            },
        )?;

        let o = observer.clone();
        self.scheduler.register(
            TaskOptions::builder()
                .name("process_outbound_trackers")
                .group(group.clone())
                .trigger(Trigger::Dynamic(outbound_interval))
                .skipper(outbound_skipper.clone())
                .build(),
            move |_task| {
                let o = o.clone();
                async move { o.process_outbound_trackers().await }
            },
        )?;

        let this = self.clone();
        self.scheduler.register(
            TaskOptions::builder()
                .name("schedule_outbound")
                .group(group)
                .trigger(Trigger::Blocks(self.central.subscribe_blocks()))
                .skipper(outbound_skipper)
                .build(),
            move |task| {
                let this = this.clone();
                let observer = observer.clone();
                let signer = signer.clone();
                async move { this.schedule_outbound(&observer, &signer, task).await }
            },
        )?;
        Ok(())
    }

    /// Dispatches the pending outbounds of one chain for the block in
    /// `task`.
    ///
    /// Nonces the destination chain already consumed are only voted on;
    /// the others get a [`Signer::process_outbound`] of their own unless one
    /// is already running.
    #[tracing::instrument(
        skip_all,
        fields(chain_id = %signer.chain_id(), height = tracing::field::Empty)
    )]
    async fn schedule_outbound(
        &self,
        observer: &Arc<ChainObserverOf<F>>,
        signer: &Arc<ChainSignerOf<F>>,
        task: TaskContext,
    ) -> Result<()> {
        let chain_id = signer.chain_id();
        let lookahead = match self.ctx.config().chain(chain_id) {
            Some(chain) => chain.outbound.schedule_lookahead,
            None => return Ok(()),
        };
        let latest = self.central.latest_height().await?;
        let height = match task.block {
            Some(block) if block.height < latest => {
                tracing::debug!(
                    height = block.height,
                    latest,
                    "Stale block, waiting for the next one"
                );
                return Ok(());
            }
            Some(block) => block.height,
            None => latest,
        };
        tracing::Span::current().record("height", height);

        let pending = self.central.list_pending_outbound(chain_id).await?;
        let Some(first) = pending.first().map(|intent| intent.nonce) else {
            return Ok(());
        };
        let next_nonce = signer.next_nonce().await?;
        let lookahead_items = usize::try_from(lookahead).unwrap_or(usize::MAX);

        for intent in pending.into_iter().take(lookahead_items) {
            check_intent(chain_id, &intent, first, lookahead)?;
            let nonce = intent.nonce;
            if nonce < next_nonce {
                signer.forget_signature(nonce);
                if let Err(e) = observer.vote_outbound_if_confirmed(nonce).await
                {
                    tracing::warn!(nonce, error = %e, "Failed to vote on a consumed nonce");
                }
                continue;
            }
            if signer.is_outbound_active(nonce) {
                tracing::trace!(nonce, "Outbound is already being processed");
                continue;
            }
            let signer = signer.clone();
            let cancel = task.cancel.clone();
            tokio::spawn(async move {
                match signer.process_outbound(&intent, height, &cancel).await {
                    Ok(tracked) => {
                        tracing::debug!(nonce, state = ?tracked.state, "Outbound processed");
                    }
                    Err(e) if e.is_transient() => {
                        tracing::debug!(nonce, error = %e, "Outbound postponed");
                    }
                    Err(e) => {
                        tracing::error!(nonce, error = %e, "Outbound failed");
                    }
                }
            });
        }
        Ok(())
    }

    fn interval_of(
        &self,
        chain_id: ChainId,
        interval: fn(&ChainConfig) -> u64,
    ) -> IntervalFn {
        let ctx = self.ctx.clone();
        Arc::new(move || {
            let ms = ctx
                .config()
                .chain(chain_id)
                .map(interval)
                .unwrap_or_else(|| ctx.config().central.block_time);
            Duration::from_millis(ms)
        })
    }

    fn skip_unless(
        &self,
        chain_id: ChainId,
        enabled: fn(&ChainConfig) -> bool,
    ) -> Skipper {
        let ctx = self.ctx.clone();
        Arc::new(move || !ctx.config().chain(chain_id).map(enabled).unwrap_or(false))
    }
}

/// Checks that `intent` can be scheduled on `chain_id`.
///
/// `first` is the lowest pending nonce. A nonce further than
/// `lookahead * 1.1` from it means the pending list is inconsistent, and
/// the whole scan is aborted.
pub fn check_intent(
    chain_id: ChainId,
    intent: &OutboundIntent,
    first: u64,
    lookahead: u64,
) -> Result<()> {
    if intent.receiver_chain_id != chain_id {
        return Err(Error::ChainIdMismatch {
            expected: chain_id.get(),
            got: intent.receiver_chain_id.get(),
        });
    }
    let bound = first.saturating_add(lookahead.saturating_mul(11) / 10);
    if intent.nonce > bound {
        return Err(Error::NonceTooHigh {
            nonce: intent.nonce,
            earliest: first,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
