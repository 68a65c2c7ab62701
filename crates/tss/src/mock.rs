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


use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use xrelay_types::{ChainId, Digest, Signature};

use crate::SigningClient;

/// A signing service that answers with a deterministic signature.
#[derive(Debug, Default)]
pub struct MockSigningClient {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockSigningClient {
    /// The signature returned for `digest`.
    pub fn signature_for(digest: &Digest) -> Signature {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(digest.as_bytes());
        bytes[32..64].copy_from_slice(digest.as_bytes());
        Signature(bytes)
    }

    /// Number of signatures requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes the next request fail with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.failures.lock().push_back(reason.into());
    }

    /// Makes every request take `delay` to answer.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait::async_trait]
impl SigningClient for MockSigningClient {
    async fn sign(
        &self,
        digest: &Digest,
        _height: u64,
        _nonce: u64,
        _chain_id: ChainId,
    ) -> xrelay_utils::Result<Signature> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().pop_front();
        match failure {
            Some(reason) => Err(xrelay_utils::Error::Signing(reason)),
            None => Ok(Self::signature_for(digest)),
        }
    }
}
