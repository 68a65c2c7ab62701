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


use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use xrelay_types::TrackedOutbound;

/// Maps an outbound nonce to the last transaction seen for it.
///
/// Bounded, least-recently-used entries are evicted first.
#[derive(Debug)]
pub struct OutboundCache {
    inner: Mutex<LruCache<u64, TrackedOutbound>>,
}

impl OutboundCache {
    /// Used when the configured capacity is `0`.
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Creates a cache holding at most `capacity` nonces.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            Self::DEFAULT_CAPACITY
        } else {
            capacity
        };
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the record of `nonce`, marking it as recently used.
    pub fn get(&self, nonce: u64) -> Option<TrackedOutbound> {
        self.inner.lock().get(&nonce).cloned()
    }

    /// Stores `tracked`, returning the record it replaced.
    pub fn put(&self, tracked: TrackedOutbound) -> Option<TrackedOutbound> {
        self.inner.lock().put(tracked.nonce, tracked)
    }

    /// Removes the record of `nonce`.
    pub fn remove(&self, nonce: u64) -> Option<TrackedOutbound> {
        self.inner.lock().pop(&nonce)
    }

    /// Number of cached nonces.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached nonces.
    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

impl Default for OutboundCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use xrelay_types::{OutboundState, TxHandle};

    use super::*;

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = OutboundCache::new(2);
        cache.put(TrackedOutbound::with_tx(1, TxHandle::from("0x1"), OutboundState::Tracking));
        cache.put(TrackedOutbound::with_tx(2, TxHandle::from("0x2"), OutboundState::Tracking));
        // touch 1 so 2 becomes the oldest.
        assert!(cache.get(1).is_some());
        cache.put(TrackedOutbound::new(3, OutboundState::Built));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(2).is_none(), "nonce 2 should be evicted");
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn later_states_replace_earlier_ones() {
        let cache = OutboundCache::default();
        assert_eq!(cache.capacity(), 1000);
        cache.put(TrackedOutbound::with_tx(7, TxHandle::from("0x7"), OutboundState::Tracking));
        let previous = cache
            .put(TrackedOutbound::with_tx(7, TxHandle::from("0x7"), OutboundState::Confirmed))
            .unwrap();
        assert_eq!(previous.state, OutboundState::Tracking);
        assert_eq!(cache.len(), 1);
        let tracked = cache.get(7).unwrap();
        assert_eq!(tracked.state, OutboundState::Confirmed);
        assert_eq!(tracked.tx_handle, Some(TxHandle::from("0x7")));
        assert_eq!(cache.remove(7).map(|t| t.nonce), Some(7));
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_selects_the_default() {
        assert_eq!(OutboundCache::new(0).capacity(), OutboundCache::DEFAULT_CAPACITY);
    }
}
