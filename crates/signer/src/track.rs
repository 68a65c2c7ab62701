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
use xrelay_types::{TxHandle, TxStatus};
use xrelay_utils::{Error, Result};

use crate::Signer;

/// How a confirmation loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Polled {
    /// The transaction reached a final status.
    Final(TxStatus),
    /// `confirmation-timeout` elapsed first.
    TimedOut,
}

impl<S, C> Signer<S, C>
where
    S: ChainSigner,
    C: SigningClient,
{
    /// Polls `tx` every `confirmation-poll-interval` until it is final or
    /// `confirmation-timeout` elapsed.
    ///
    /// Failed status queries are logged and retried on the next interval.
    pub(crate) async fn poll_status(
        &self,
        tx: &TxHandle,
        cancel: &CancellationToken,
    ) -> Result<Polled> {
        let interval = Duration::from_millis(self.config.confirmation_poll_interval);
        let timeout = Duration::from_millis(self.config.confirmation_timeout);
        let deadline = self.clock.now() + timeout;
        loop {
            match self.chain.transaction_status(tx).await {
                Ok(status) if status.is_final() => return Ok(Polled::Final(status)),
                Ok(status) => tracing::trace!(%tx, ?status, "Outbound not final yet"),
                Err(e) => tracing::debug!(%tx, error = %e, "Failed to query outbound status"),
            }
            if self.clock.now() >= deadline {
                return Ok(Polled::TimedOut);
            }
            self.pause(interval, cancel).await?;
        }
    }

    /// Sleeps on the injected clock, failing with
    /// [`Error::Cancelled`] as soon as `cancel` fires.
    pub(crate) async fn pause(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }
}
