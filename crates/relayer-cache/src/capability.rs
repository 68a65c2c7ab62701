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


use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use xrelay_types::CapabilityHandle;
use xrelay_utils::clock::SharedClock;

/// A single-slot TTL cache for a chain's [`CapabilityHandle`].
///
/// The lock is only held to read or replace the slot, never while fetching,
/// so two concurrent misses may both fetch; the last write wins.
#[derive(Debug)]
pub struct CapabilityCache {
    handle: Mutex<Option<CapabilityHandle>>,
    ttl: Duration,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CapabilityCache {
    /// Handles are refetched after five minutes unless configured otherwise.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    /// Create a new, empty cache.
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            handle: Mutex::new(None),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether a handle is cached and still inside its TTL.
    pub fn valid(&self) -> bool {
        let now = self.clock.now();
        self.handle
            .lock()
            .as_ref()
            .map(|h| h.is_valid(now, self.ttl))
            .unwrap_or(false)
    }

    /// Check if cache is valid and return the cached handle if so.
    pub fn get_if_valid(&self) -> Option<CapabilityHandle> {
        let now = self.clock.now();
        let guard = self.handle.lock();
        match guard.as_ref() {
            Some(h) if h.is_valid(now, self.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(h.clone())
            }
            _ => None,
        }
    }

    /// Replaces the cached handle, stamped with the current time.
    pub fn update(&self, handle_id: impl Into<String>) -> CapabilityHandle {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let handle = CapabilityHandle::new(handle_id, self.clock.now());
        *self.handle.lock() = Some(handle.clone());
        handle
    }

    /// Returns the cached handle, or runs `fetch` and caches its result.
    ///
    /// A failed fetch leaves the cache untouched.
    pub async fn get_cached<F, Fut>(
        &self,
        fetch: F,
    ) -> xrelay_utils::Result<CapabilityHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = xrelay_utils::Result<String>>,
    {
        if let Some(handle) = self.get_if_valid() {
            return Ok(handle);
        }
        let handle_id = fetch().await?;
        let handle = self.update(handle_id);
        tracing::debug!(handle = %handle.handle_id, "capability handle refreshed");
        Ok(handle)
    }

    /// Invalidate the cache (force next access to fetch fresh data)
    pub fn invalidate(&self) {
        self.handle.lock().take();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to fetch.
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use xrelay_utils::clock::ManualClock;

    use super::*;

    fn cache(ttl: Duration) -> (CapabilityCache, ManualClock) {
        let clock = ManualClock::new();
        (CapabilityCache::new(ttl, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn handle_is_reused_until_ttl_expires() {
        let (cache, clock) = cache(CapabilityCache::DEFAULT_TTL);
        let fetches = AtomicUsize::new(0);
        let fetch = || {
            let n = fetches.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("0xcap{n}")) }
        };

        assert!(!cache.valid());
        let first = cache.get_cached(fetch).await.unwrap();
        assert_eq!(first.handle_id, "0xcap0");
        assert!(cache.valid());

        clock.advance(Duration::from_secs(299));
        let again = cache.get_cached(fetch).await.unwrap();
        assert_eq!(again, first, "still inside the TTL");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(1));
        assert!(!cache.valid(), "expired exactly at the TTL");
        let fresh = cache.get_cached(fetch).await.unwrap();
        assert_eq!(fresh.handle_id, "0xcap1");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 1, misses: 2 });
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_cache_empty() {
        let (cache, _clock) = cache(Duration::from_secs(1));
        let res = cache
            .get_cached(|| async { Err(xrelay_utils::Error::Rpc("down".into())) })
            .await;
        assert!(res.is_err());
        assert!(!cache.valid());
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let (cache, _clock) = cache(Duration::from_secs(60));
        cache.update("0xold");
        assert!(cache.valid());
        cache.invalidate();
        assert!(cache.get_if_valid().is_none());
        let handle = cache
            .get_cached(|| async { Ok(String::from("0xnew")) })
            .await
            .unwrap();
        assert_eq!(handle.handle_id, "0xnew");
    }
}
