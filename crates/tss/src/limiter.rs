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


use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use xrelay_types::ChainId;

/// A non-blocking bound on the number of signatures in flight.
///
/// `acquire` either takes a slot immediately or fails with
/// [`Throttled`](xrelay_utils::Error::Throttled); callers retry on a later
/// tick instead of queueing.
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    pending: AtomicU32,
}

impl RateLimiter {
    /// Used when the configured maximum is `0`.
    pub const DEFAULT_MAX_PENDING: u32 = 100;

    /// Create a new `RateLimiter` allowing `max` concurrent signatures.
    pub fn new(max: u32) -> Self {
        let max = if max == 0 {
            Self::DEFAULT_MAX_PENDING
        } else {
            max
        };
        Self {
            max,
            pending: AtomicU32::new(0),
        }
    }

    /// The maximum number of concurrent signatures.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// The number of signatures currently in flight.
    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Takes one slot.
    pub fn acquire(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> xrelay_utils::Result<()> {
        let max = self.max;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|pending| {
                tracing::debug!(
                    %chain_id,
                    nonce,
                    pending,
                    max,
                    "too many pending signatures"
                );
                xrelay_utils::Error::Throttled {
                    chain_id: chain_id.get(),
                    nonce,
                }
            })
    }

    /// Returns one slot. Releasing more than was acquired is a no-op.
    pub fn release(&self, chain_id: ChainId, nonce: u64) {
        let released = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            });
        if released.is_err() {
            tracing::trace!(%chain_id, nonce, "release without a pending signature");
        }
    }

    /// Takes one slot, returned when the [`Permit`] is dropped.
    pub fn try_permit(
        self: &Arc<Self>,
        chain_id: ChainId,
        nonce: u64,
    ) -> xrelay_utils::Result<Permit> {
        self.acquire(chain_id, nonce)?;
        Ok(Permit {
            limiter: self.clone(),
            chain_id,
            nonce,
        })
    }
}

/// One slot of a [`RateLimiter`].
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct Permit {
    limiter: Arc<RateLimiter>,
    chain_id: ChainId,
    nonce: u64,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.release(self.chain_id, self.nonce);
    }
}
