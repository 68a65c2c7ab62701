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


//! Chains that live inside the process.
//!
//! Every configured chain is backed by the in-memory mocks of
//! `xrelay-chain-traits`, the central chain produces a block every
//! `central.block-time` and the signing service signs locally. Nothing is
//! ever sent over the network, which makes it a safe way to try a
//! configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use xrelay_chain_traits::mock::{
    MockCentralChain, MockChainObserver, MockChainSigner,
};
use xrelay_config::ChainConfig;
use xrelay_context::RelayerContext;
use xrelay_tss::mock::MockSigningClient;
use xrelay_tss::SigningClient;

use crate::orchestrator::{ChainClients, ChainFactory};

/// Connects every chain to an in-process mock.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackFactory;

#[async_trait::async_trait]
impl ChainFactory for LoopbackFactory {
    type Observer = MockChainObserver;
    type Signer = MockChainSigner;

    async fn connect(
        &self,
        config: &ChainConfig,
    ) -> crate::Result<ChainClients<MockChainObserver, MockChainSigner>> {
        tracing::warn!(
            chain = %config.name,
            chain_id = %config.chain_id,
            rpc = %config.rpc_endpoint.as_url(),
            "!!WARNING!!: using a loopback chain, the endpoint is never contacted",
        );
        Ok(ChainClients {
            observer: Arc::new(MockChainObserver::new(config.chain_id)),
            signer: Arc::new(MockChainSigner::new(config.chain_id)),
        })
    }
}

/// A central chain without any pending outbound.
pub fn central() -> Arc<MockCentralChain> {
    Arc::new(MockCentralChain::default())
}

/// A signing service that signs locally.
pub fn tss() -> Arc<dyn SigningClient> {
    Arc::new(MockSigningClient::default())
}

/// Publishes a block on `central` every `central.block-time`, until the
/// context shuts down.
pub fn spawn_block_producer(
    central: Arc<MockCentralChain>,
    ctx: RelayerContext,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = ctx.shutdown_signal();
        let mut height = 0u64;
        loop {
            let block_time =
                Duration::from_millis(ctx.config().central.block_time);
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(block_time) => {
                    height += 1;
                    central.publish_block(height);
                }
            }
        }
        tracing::debug!(height, "block producer stopped");
    })
}
