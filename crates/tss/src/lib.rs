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
//! # TSS Signing Coordination 🕸️
//!
//! Everything that stands between an outbound and the threshold-signing
//! service: a global [`RateLimiter`] and the [`SigningClient`] seam, combined
//! in [`RateLimitedSigner`].

use std::sync::Arc;

use tokio::sync::Mutex;
use xrelay_types::{ChainId, Digest, Signature};
use xrelay_utils::metric::Metrics;
use xrelay_utils::probe;

mod limiter;
/// Mocked signing client for tests.
#[cfg(any(test, feature = "mocks"))]
pub mod mock;

pub use limiter::{Permit, RateLimiter};

/// A client of the threshold-signing service.
#[async_trait::async_trait]
pub trait SigningClient: Send + Sync {
    /// Requests a signature over `digest` for the outbound `nonce` of `chain_id`.
    ///
    /// `height` is the central-chain height the outbound was scheduled at; all
    /// committee members must agree on it to form the same signing session.
    async fn sign(
        &self,
        digest: &Digest,
        height: u64,
        nonce: u64,
        chain_id: ChainId,
    ) -> xrelay_utils::Result<Signature>;
}

#[async_trait::async_trait]
impl<T> SigningClient for Arc<T>
where
    T: SigningClient + ?Sized,
{
    async fn sign(
        &self,
        digest: &Digest,
        height: u64,
        nonce: u64,
        chain_id: ChainId,
    ) -> xrelay_utils::Result<Signature> {
        T::sign(self, digest, height, nonce, chain_id).await
    }
}

/// A [`SigningClient`] guarded by the process-wide [`RateLimiter`].
///
/// Cloning is cheap and every clone shares the same limiter.
pub struct RateLimitedSigner<C> {
    client: C,
    limiter: Arc<RateLimiter>,
    metrics: Arc<Mutex<Metrics>>,
}

impl<C: Clone> Clone for RateLimitedSigner<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            limiter: self.limiter.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<C> std::fmt::Debug for RateLimitedSigner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedSigner")
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl<C> RateLimitedSigner<C>
where
    C: SigningClient,
{
    /// Creates a new signer sharing `limiter`.
    pub fn new(
        client: C,
        limiter: Arc<RateLimiter>,
        metrics: Arc<Mutex<Metrics>>,
    ) -> Self {
        Self {
            client,
            limiter,
            metrics,
        }
    }

    /// The shared limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Signs `digest`, or fails fast with
    /// [`Throttled`](xrelay_utils::Error::Throttled) when the limiter is
    /// saturated.
    ///
    /// The permit is held only while the signing service works on the request.
    #[tracing::instrument(skip_all, fields(%chain_id, nonce, %digest))]
    pub async fn sign(
        &self,
        digest: &Digest,
        height: u64,
        nonce: u64,
        chain_id: ChainId,
    ) -> xrelay_utils::Result<Signature> {
        let permit = match self.limiter.try_permit(chain_id, nonce) {
            Ok(permit) => permit,
            Err(e) => {
                self.metrics.lock().await.signing_throttled.inc();
                return Err(e);
            }
        };
        {
            let metrics = self.metrics.lock().await;
            metrics.signatures_requested.inc();
            metrics.pending_signatures.set(f64::from(self.limiter.pending()));
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Signing,
            %chain_id,
            nonce,
            height,
            pending = self.limiter.pending(),
            requested = true,
        );
        let result = self.client.sign(digest, height, nonce, chain_id).await;
        drop(permit);
        self.metrics
            .lock()
            .await
            .pending_signatures
            .set(f64::from(self.limiter.pending()));
        match &result {
            Ok(_) => tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Signing,
                %chain_id,
                nonce,
                signed = true,
            ),
            Err(e) => tracing::warn!(%chain_id, nonce, error = %e, "signing failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSigningClient;

    fn signer(max: u32) -> (RateLimitedSigner<Arc<MockSigningClient>>, Arc<MockSigningClient>) {
        let client = Arc::new(MockSigningClient::default());
        let metrics = Arc::new(Mutex::new(Metrics::new().unwrap()));
        let signer = RateLimitedSigner::new(
            client.clone(),
            Arc::new(RateLimiter::new(max)),
            metrics,
        );
        (signer, client)
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn permit_is_returned_after_signing() {
        let (signer, client) = signer(1);
        let digest = Digest::sha256d(b"test", b"payload");
        let sig = signer.sign(&digest, 10, 1, ChainId(1)).await.unwrap();
        assert_eq!(sig, MockSigningClient::signature_for(&digest));
        assert_eq!(signer.limiter().pending(), 0);
        // the single permit is free again.
        signer.sign(&digest, 10, 2, ChainId(1)).await.unwrap();
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn permit_is_returned_after_a_failure() {
        let (signer, client) = signer(1);
        client.fail_next("keygen in progress");
        let digest = Digest::sha256d(b"test", b"payload");
        let err = signer.sign(&digest, 10, 1, ChainId(1)).await.unwrap_err();
        assert!(matches!(err, xrelay_utils::Error::Signing(_)));
        assert_eq!(signer.limiter().pending(), 0);
    }

    #[tokio::test]
    async fn saturated_limiter_throttles_without_calling_the_service() {
        let (signer, client) = signer(1);
        let _held = signer.limiter().try_permit(ChainId(1), 99).unwrap();
        let digest = Digest::sha256d(b"test", b"payload");
        let err = signer.sign(&digest, 10, 1, ChainId(1)).await.unwrap_err();
        assert!(
            matches!(err, xrelay_utils::Error::Throttled { chain_id: 1, nonce: 1 }),
            "unexpected error: {err:?}"
        );
        assert_eq!(client.calls(), 0, "the TSS must not be asked");
        assert_eq!(signer.metrics.lock().await.signing_throttled.get(), 1.0);
    }
}
