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
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relay client.
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};

use xrelay_config::RelayerConfig;
use xrelay_store::SledStore;
use xrelay_utils::metric::{self, Metrics};

/// RelayerContext contains the relay client's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The current configuration snapshot.
    ///
    /// Readers take a cheap `Arc` clone; a refresh swaps the whole snapshot.
    config: Arc<RwLock<Arc<RelayerConfig>>>,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// The initial `shutdown` trigger is provided by the `run` caller. When a
    /// task is spawned, it is passed a broadcast receiver handle. When a
    /// graceful shutdown is initiated, a `()` value is sent via the
    /// broadcast::Sender. Each active task receives it, reaches a safe
    /// terminal state, and completes.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the relay client
    pub metrics: Arc<Mutex<metric::Metrics>>,
    store: SledStore,
}

impl std::fmt::Debug for RelayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerContext")
            .field("store", &self.store)
            .finish()
    }
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: RelayerConfig,
        store: SledStore,
    ) -> xrelay_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Mutex::new(Metrics::new()?));
        Ok(Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            notify_shutdown,
            metrics,
            store,
        })
    }

    /// Returns the current configuration snapshot.
    pub fn config(&self) -> Arc<RelayerConfig> {
        self.config.read().clone()
    }

    /// Replaces the configuration snapshot.
    ///
    /// Tasks that already hold the previous snapshot keep using it until
    /// they ask again.
    pub fn set_config(&self, config: RelayerConfig) {
        *self.config.write() = Arc::new(config);
    }

    /// Reloads the configuration from `config_dir` and swaps the snapshot.
    ///
    /// On error the current snapshot is kept.
    pub fn reload_config<P: AsRef<Path>>(
        &self,
        config_dir: P,
    ) -> xrelay_utils::Result<Arc<RelayerConfig>> {
        let config = xrelay_config::utils::load(config_dir)?;
        self.set_config(config);
        tracing::debug!("configuration snapshot refreshed");
        Ok(self.config())
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }
    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns [Sled](https://sled.rs)-based database store
    pub fn store(&self) -> &SledStore {
        &self.store
    }
}

/// Listens for the shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the
/// process should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx = RelayerContext::new(
            RelayerConfig::default(),
            SledStore::temporary().unwrap(),
        )
        .unwrap();
        let mut a = ctx.shutdown_signal();
        let mut b = ctx.shutdown_signal();
        ctx.shutdown();
        a.recv().await;
        b.recv().await;
        assert!(a.is_shutdown() && b.is_shutdown());
        // a second recv returns immediately.
        a.recv().await;
    }

    #[test]
    fn config_snapshot_is_swapped_atomically() {
        let ctx = RelayerContext::new(
            RelayerConfig::default(),
            SledStore::temporary().unwrap(),
        )
        .unwrap();
        let before = ctx.config();
        let mut next = RelayerConfig::default();
        next.tss.max_pending_signatures = 7;
        ctx.set_config(next);
        assert_eq!(before.tss.max_pending_signatures, 100);
        assert_eq!(ctx.config().tss.max_pending_signatures, 7);
    }

    #[test]
    fn failed_reload_keeps_the_snapshot() {
        let ctx = RelayerContext::new(
            RelayerConfig::default(),
            SledStore::temporary().unwrap(),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "[chains.x]\nname = 1")
            .unwrap();
        assert!(ctx.reload_config(dir.path()).is_err());
        assert!(ctx.config().chains.is_empty());
    }
}
