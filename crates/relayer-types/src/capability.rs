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


use std::time::{Duration, Instant};

/// A scarce, address-bound authorization object some chains require to
/// build privileged transactions (for example a withdraw capability).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityHandle {
    /// On-chain identifier of the handle.
    pub handle_id: String,
    /// When the handle was fetched from the chain.
    pub fetched_at: Instant,
}

impl CapabilityHandle {
    /// Creates a handle fetched at `fetched_at`.
    pub fn new(handle_id: impl Into<String>, fetched_at: Instant) -> Self {
        Self {
            handle_id: handle_id.into(),
            fetched_at,
        }
    }

    /// A handle is usable while `now - fetched_at < ttl`.
    pub fn is_valid(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_window_is_half_open() {
        let t0 = Instant::now();
        let ttl = Duration::from_secs(300);
        let handle = CapabilityHandle::new("0xcap", t0);
        assert!(handle.is_valid(t0, ttl));
        assert!(handle.is_valid(t0 + ttl - Duration::from_millis(1), ttl));
        assert!(!handle.is_valid(t0 + ttl, ttl), "expires exactly at TTL");
    }
}
