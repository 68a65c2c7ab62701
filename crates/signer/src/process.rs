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

use tokio_util::sync::CancellationToken;
use xrelay_chain_traits::ChainSigner;
use xrelay_tss::SigningClient;
use xrelay_types::{
    CapabilityHandle, FailureKind, OutboundIntent, OutboundState, Signature,
    TrackedOutbound, TxHandle, TxStatus,
};
use xrelay_utils::{probe, Result};

use crate::track::Polled;
use crate::Signer;

/// Where an invocation picks up an outbound a previous one left behind.
#[derive(Debug)]
enum Resume {
    /// Already settled and reported.
    Done(TrackedOutbound),
    /// A known transaction consumed the nonce since, it only needs reporting.
    Settled { tx: TxHandle, by_cancel: bool },
    /// A known transaction is still in flight.
    Track { tx: TxHandle, is_cancel: bool },
    /// The nonce has to be cancelled.
    Cancel,
    /// Nothing usable, build and sign again.
    Fresh,
}

impl<S, C> Signer<S, C>
where
    S: ChainSigner,
    C: SigningClient,
{
    /// Drives `intent` until its nonce is consumed and reported, or until
    /// the attempt can go no further.
    ///
    /// Returns the state the outbound is left in. Transient conditions (a
    /// saturated rate limiter, another invocation working on the same nonce,
    /// an unreachable chain) are returned as errors without side effects on
    /// the destination chain; the next scheduling cycle retries them.
    #[tracing::instrument(
        skip_all,
        fields(chain_id = %self.chain.chain_id(), nonce = intent.nonce)
    )]
    pub async fn process_outbound(
        &self,
        intent: &OutboundIntent,
        central_height: u64,
        cancel: &CancellationToken,
    ) -> Result<TrackedOutbound> {
        let nonce = intent.nonce;
        if let Err(e) = self.chain.validate(intent) {
            tracing::warn!(error = %e, "Invalid outbound");
            let invalid = TrackedOutbound::new(nonce, OutboundState::Invalid);
            return Ok(self.finish(invalid).await);
        }
        let _in_flight = self.enter(nonce)?;

        match self.resume(intent).await? {
            Resume::Done(tracked) => {
                tracing::debug!(state = ?tracked.state, "Outbound already settled");
                self.forget_signature(nonce);
                Ok(tracked)
            }
            Resume::Settled { tx, by_cancel } => {
                self.settle(nonce, tx, by_cancel).await
            }
            Resume::Track {
                tx,
                is_cancel: false,
            } => {
                self.track_withdrawal(intent, tx, central_height, cancel)
                    .await
            }
            Resume::Track {
                tx,
                is_cancel: true,
            } => self.track_cancel(nonce, tx, cancel).await,
            Resume::Cancel => {
                self.cancel_outbound(intent, central_height, cancel).await
            }
            Resume::Fresh => {
                self.withdraw(intent, central_height, cancel).await
            }
        }
    }

    async fn resume(&self, intent: &OutboundIntent) -> Result<Resume> {
        let previous = match self.outbound_cache.get(intent.nonce) {
            Some(previous) => previous,
            None => return Ok(Resume::Fresh),
        };
        if matches!(
            previous.state,
            OutboundState::Confirmed | OutboundState::Failed { retryable: false }
        ) {
            return Ok(Resume::Done(previous));
        }
        let tx = match previous.tx_handle {
            Some(tx) => tx,
            None => return Ok(Resume::Fresh),
        };
        let is_cancel = previous.is_cancel;

        let status = self.chain.transaction_status(&tx).await?;
        tracing::debug!(
            %tx,
            previous = ?previous.state,
            ?status,
            "Resuming outbound"
        );
        let resume = match status {
            TxStatus::Success => Resume::Settled {
                tx,
                by_cancel: is_cancel,
            },
            TxStatus::Cancelled => Resume::Settled {
                tx,
                by_cancel: true,
            },
            TxStatus::Pending => Resume::Track { tx, is_cancel },
            TxStatus::NotFound | TxStatus::Failed(_) if is_cancel => {
                Resume::Cancel
            }
            TxStatus::NotFound => Resume::Fresh,
            TxStatus::Failed(reason) => {
                match self.chain.classify_failure(&reason) {
                    FailureKind::Retryable => Resume::Fresh,
                    FailureKind::NonRetryable => Resume::Cancel,
                }
            }
        };
        Ok(resume)
    }

    async fn withdraw(
        &self,
        intent: &OutboundIntent,
        central_height: u64,
        cancel: &CancellationToken,
    ) -> Result<TrackedOutbound> {
        let nonce = intent.nonce;
        if self.compliance.is_restricted(&intent.receiver) {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::INFO,
                kind = %probe::Kind::Compliance,
                chain_id = %self.chain.chain_id(),
                nonce,
                address = %intent.receiver,
            );
            tracing::warn!(
                receiver = %intent.receiver,
                "Restricted receiver, cancelling the nonce"
            );
            self.metrics.lock().await.compliance_skips.inc();
            return self.cancel_outbound(intent, central_height, cancel).await;
        }
        let receiver = match self.receiver(intent) {
            Some(receiver) => receiver,
            None => {
                tracing::warn!(
                    receiver = %intent.receiver,
                    "Invalid recipient and no custody address, cancelling the nonce"
                );
                return self
                    .cancel_outbound(intent, central_height, cancel)
                    .await;
            }
        };
        let capability = self.capability(intent).await?;
        let tx = self
            .chain
            .build_withdrawal(intent, receiver, capability.as_ref())
            .await?;
        self.record(TrackedOutbound::new(nonce, OutboundState::Built));

        let signature = self.sign(&tx, central_height, nonce).await?;
        let signed =
            self.record(TrackedOutbound::new(nonce, OutboundState::Signed));
        if self.dry_mode {
            tracing::info!(?tx, "Dry mode, not broadcasting the withdrawal");
            return Ok(signed);
        }

        let handle = self.chain.broadcast(&tx, &signature).await?;
        self.record(TrackedOutbound::with_tx(
            nonce,
            handle.clone(),
            OutboundState::Broadcast,
        ));
        self.track_withdrawal(intent, handle, central_height, cancel)
            .await
    }

    async fn track_withdrawal(
        &self,
        intent: &OutboundIntent,
        tx: TxHandle,
        central_height: u64,
        cancel: &CancellationToken,
    ) -> Result<TrackedOutbound> {
        let nonce = intent.nonce;
        self.record(TrackedOutbound::with_tx(
            nonce,
            tx.clone(),
            OutboundState::Tracking,
        ));
        match self.poll_status(&tx, cancel).await? {
            Polled::Final(TxStatus::Success) => {
                self.settle(nonce, tx, false).await
            }
            Polled::Final(TxStatus::Cancelled) => {
                self.settle(nonce, tx, true).await
            }
            Polled::Final(TxStatus::Failed(reason)) => {
                match self.chain.classify_failure(&reason) {
                    FailureKind::Retryable => {
                        tracing::warn!(%tx, %reason, "Outbound failed, it will be retried");
                        // the retry is built against a fresh capability
                        self.capability.invalidate();
                        let failed = TrackedOutbound::with_tx(
                            nonce,
                            tx,
                            OutboundState::Failed { retryable: true },
                        );
                        Ok(self.finish(failed).await)
                    }
                    FailureKind::NonRetryable => {
                        tracing::warn!(%tx, %reason, "Outbound failed for good, cancelling the nonce");
                        let settle_delay = Duration::from_millis(
                            self.config.cancel_settle_delay,
                        );
                        self.pause(settle_delay, cancel).await?;
                        self.cancel_outbound(intent, central_height, cancel)
                            .await
                    }
                }
            }
            Polled::Final(TxStatus::Pending | TxStatus::NotFound)
            | Polled::TimedOut => {
                tracing::warn!(%tx, "Outbound not confirmed in time");
                let timed_out = TrackedOutbound::with_tx(
                    nonce,
                    tx,
                    OutboundState::TimedOut,
                );
                Ok(self.finish(timed_out).await)
            }
        }
    }

    /// Consumes the nonce of `intent` with a transaction that does nothing
    /// else.
    async fn cancel_outbound(
        &self,
        intent: &OutboundIntent,
        central_height: u64,
        cancel: &CancellationToken,
    ) -> Result<TrackedOutbound> {
        let nonce = intent.nonce;
        let capability = self.capability(intent).await?;
        let gas_budget =
            intent.gas_budget.max(self.config.min_cancel_gas_budget);
        let tx = self
            .chain
            .build_cancel(intent, capability.as_ref(), gas_budget)
            .await?;
        let signature = self.sign(&tx, central_height, nonce).await?;
        if self.dry_mode {
            tracing::info!(?tx, "Dry mode, not broadcasting the cancellation");
            return Ok(
                self.record(TrackedOutbound::new(nonce, OutboundState::Signed))
            );
        }

        let handle = self.chain.broadcast(&tx, &signature).await?;
        self.metrics.lock().await.outbound_cancellations.inc();
        self.record(TrackedOutbound::cancellation(
            nonce,
            handle.clone(),
            OutboundState::Broadcast,
        ));
        self.track_cancel(nonce, handle, cancel).await
    }

    async fn track_cancel(
        &self,
        nonce: u64,
        tx: TxHandle,
        cancel: &CancellationToken,
    ) -> Result<TrackedOutbound> {
        self.record(TrackedOutbound::cancellation(
            nonce,
            tx.clone(),
            OutboundState::Tracking,
        ));
        let state = match self.poll_status(&tx, cancel).await? {
            Polled::Final(TxStatus::Success | TxStatus::Cancelled) => {
                return self.settle(nonce, tx, true).await;
            }
            Polled::Final(TxStatus::Failed(reason)) => {
                tracing::error!(%tx, %reason, "Cancellation failed");
                OutboundState::Failed { retryable: true }
            }
            Polled::Final(TxStatus::Pending | TxStatus::NotFound)
            | Polled::TimedOut => {
                tracing::warn!(%tx, "Cancellation not confirmed in time");
                OutboundState::TimedOut
            }
        };
        let tracked = TrackedOutbound::cancellation(nonce, tx, state);
        Ok(self.finish(tracked).await)
    }

    /// Reports `tx` as the transaction that consumed `nonce`.
    async fn settle(
        &self,
        nonce: u64,
        tx: TxHandle,
        by_cancel: bool,
    ) -> Result<TrackedOutbound> {
        let chain_id = self.chain.chain_id();
        self.central.post_outbound_tracker(chain_id, nonce, &tx).await?;
        self.metrics.lock().await.outbound_trackers_posted.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Tracker,
            %chain_id,
            nonce,
            %tx,
            by_cancel,
        );
        let tracked = if by_cancel {
            TrackedOutbound::cancellation(
                nonce,
                tx,
                OutboundState::Failed { retryable: false },
            )
        } else {
            TrackedOutbound::with_tx(nonce, tx, OutboundState::Confirmed)
        };
        self.forget_signature(nonce);
        Ok(self.finish(tracked).await)
    }

    /// The address the withdrawal pays, `None` if nobody can be paid.
    fn receiver<'a>(&'a self, intent: &'a OutboundIntent) -> Option<&'a str> {
        if self.chain.is_valid_recipient(&intent.receiver) {
            return Some(intent.receiver.as_str());
        }
        // provisional policy until invalid recipients are refunded on the
        // source chain
        let custody = self.custody_address.as_deref()?;
        tracing::warn!(
            receiver = %intent.receiver,
            custody,
            "Invalid recipient, paying the custody address instead"
        );
        Some(custody)
    }

    async fn capability(
        &self,
        intent: &OutboundIntent,
    ) -> Result<Option<CapabilityHandle>> {
        if !self.chain.requires_capability(intent) {
            return Ok(None);
        }
        let chain = &self.chain;
        let handle = self
            .capability
            .get_cached(|| chain.fetch_capability())
            .await?;
        Ok(Some(handle))
    }

    /// Signs `tx`, reusing the signature of an identical earlier attempt.
    async fn sign(
        &self,
        tx: &S::Tx,
        central_height: u64,
        nonce: u64,
    ) -> Result<Signature> {
        let digest = self.chain.signing_digest(tx)?;
        let reused = match self.signatures.lock().get(&nonce) {
            Some((signed, signature)) if *signed == digest => Some(*signature),
            _ => None,
        };
        if let Some(signature) = reused {
            tracing::debug!(%digest, "Reusing signature");
            return Ok(signature);
        }
        let signature = self
            .tss
            .sign(&digest, central_height, nonce, self.chain.chain_id())
            .await?;
        let capacity = self.outbound_cache.capacity();
        let mut signatures = self.signatures.lock();
        signatures.put(nonce, (digest, signature));
        while signatures.len() > capacity {
            signatures.pop_lru();
        }
        Ok(signature)
    }

    fn record(&self, tracked: TrackedOutbound) -> TrackedOutbound {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Outbound,
            chain_id = %self.chain.chain_id(),
            nonce = tracked.nonce,
            tx = ?tracked.tx_handle,
            state = ?tracked.state,
            cancel = tracked.is_cancel,
        );
        self.outbound_cache.put(tracked.clone());
        tracked
    }

    async fn finish(&self, tracked: TrackedOutbound) -> TrackedOutbound {
        let tracked = self.record(tracked);
        if tracked.state.is_terminal() {
            self.metrics.lock().await.outbounds_processed.inc();
        }
        tracked
    }
}
