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

//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the relay client.
//!
//! ## Overview
//!
//! The relayer configuration module is responsible for configuring the relay client.
//! Possible configuration include:
//! * `tss`: limits in front of the threshold-signing service.
//! * `central`: timing of the central coordinating chain.
//! * `compliance`: the list of restricted addresses.
//! * `chains`: every connected chain, with its `inbound` and `outbound` settings.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the optional fields.
pub mod defaults;
/// Utils for processing configuration
pub mod utils;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xrelay_types::{ChainId, RpcEndpoint};

/// RelayerConfig is the configuration for the relay client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// Threshold-signing service limits.
    #[serde(default)]
    pub tss: TssConfig,
    /// Central chain timing.
    #[serde(default)]
    pub central: CentralConfig,
    /// Compliance screening.
    #[serde(default)]
    pub compliance: ComplianceConfig,
    /// Connected chains and their configuration.
    ///
    /// a map between chain name and its configuration, re-keyed by chain id
    /// once loaded.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
}

impl RelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> xrelay_utils::Result<()> {
        let mut seen = HashSet::new();
        for chain in self.chains.values() {
            if !seen.insert(chain.chain_id) {
                tracing::error!(
                    chain_id = %chain.chain_id,
                    "chain id is configured more than once"
                );
                return Err(xrelay_utils::Error::Generic(
                    "duplicate chain id in the configuration",
                ));
            }
            if chain.outbound.enabled && chain.outbound.schedule_lookahead == 0
            {
                return Err(xrelay_utils::Error::Generic(
                    "outbound.schedule-lookahead must be greater than zero",
                ));
            }
            if chain.custody_address.is_none() {
                tracing::warn!(
                    "!!WARNING!!: chain {} ({}) has no custody-address, \
                    outbounds to invalid recipients will be rejected by the chain",
                    chain.name,
                    chain.chain_id,
                );
            }
        }
        Ok(())
    }

    /// Returns the configuration of the given chain, if it is enabled.
    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.get(&chain_id.to_string())
    }

    /// The chain ids of every enabled chain.
    pub fn enabled_chain_ids(&self) -> HashSet<ChainId> {
        self.chains
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.chain_id)
            .collect()
    }
}

/// TssConfig is the configuration of the threshold-signing client.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TssConfig {
    /// Maximum number of signatures waited on at the same time.
    ///
    /// `0` selects the default.
    #[serde(default = "defaults::max_pending_signatures")]
    pub max_pending_signatures: u32,
}

impl Default for TssConfig {
    fn default() -> Self {
        Self {
            max_pending_signatures: defaults::max_pending_signatures(),
        }
    }
}

/// CentralConfig describes the central coordinating chain.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CentralConfig {
    /// Block time in milliseconds.
    #[serde(default = "defaults::central_block_time")]
    pub block_time: u64,
    /// How often the configuration snapshot is refreshed, in milliseconds.
    #[serde(default = "defaults::config_update_interval")]
    pub config_update_interval: u64,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            block_time: defaults::central_block_time(),
            config_update_interval: defaults::config_update_interval(),
        }
    }
}

impl CentralConfig {
    /// Interval of the chain synchronization task: twice the block time.
    pub fn sync_chains_interval(&self) -> Duration {
        Duration::from_millis(self.block_time.saturating_mul(2))
    }
}

/// ComplianceConfig lists addresses that must never be relayed for.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComplianceConfig {
    /// Restricted addresses, compared case-insensitively.
    #[serde(default)]
    pub restricted_addresses: Vec<String>,
}

/// ChainConfig is the configuration of one connected chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Boolean indicating the chain is enabled.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// The chain id as known by the central chain.
    pub chain_id: ChainId,
    /// Node RPC endpoint, may reference an environment variable (`$NAME`).
    pub rpc_endpoint: RpcEndpoint,
    /// Address receiving outbounds whose recipient is invalid on this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custody_address: Option<String>,
    /// Sign outbounds but never broadcast them or post trackers.
    #[serde(default)]
    pub dry_mode: bool,
    /// How long a capability handle stays valid, in milliseconds.
    #[serde(default = "defaults::capability_ttl")]
    pub capability_ttl: u64,
    /// Number of outbound nonces kept in the correlation cache.
    #[serde(default = "defaults::outbound_cache_capacity")]
    pub outbound_cache_capacity: usize,
    /// Inbound observation.
    #[serde(default)]
    pub inbound: InboundConfig,
    /// Outbound signing.
    #[serde(default)]
    pub outbound: OutboundConfig,
}

/// InboundConfig is the configuration of the inbound observation of a chain.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InboundConfig {
    /// if it is enabled for this chain or not.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Polling interval in milliseconds
    #[serde(default = "defaults::inbound_polling_interval")]
    pub polling_interval: u64,
    /// The maximum number of events to fetch in one scan.
    #[serde(default = "defaults::max_items_per_scan")]
    pub max_items_per_scan: u64,
    /// The maximum number of inbound trackers to handle in one scan.
    #[serde(default = "defaults::max_trackers_per_scan")]
    pub max_trackers_per_scan: usize,
    /// Milliseconds between two attempts to post a vote.
    #[serde(default = "defaults::vote_retry_interval")]
    pub vote_retry_interval: u64,
    /// How many times a failed vote is retried.
    #[serde(default = "defaults::vote_max_retries")]
    pub vote_max_retries: usize,
    /// Start scanning from this position when there is no stored cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_from: Option<u64>,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            polling_interval: defaults::inbound_polling_interval(),
            max_items_per_scan: defaults::max_items_per_scan(),
            max_trackers_per_scan: defaults::max_trackers_per_scan(),
            vote_retry_interval: defaults::vote_retry_interval(),
            vote_max_retries: defaults::vote_max_retries(),
            scan_from: None,
        }
    }
}

/// OutboundConfig is the configuration of the outbound signing of a chain.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundConfig {
    /// if it is enabled for this chain or not.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Outbound tracker polling interval in milliseconds.
    #[serde(default = "defaults::outbound_polling_interval")]
    pub polling_interval: u64,
    /// Maximum number of pending outbounds scheduled per central block.
    #[serde(default = "defaults::schedule_lookahead")]
    pub schedule_lookahead: u64,
    /// Milliseconds between two transaction status queries.
    #[serde(default = "defaults::confirmation_poll_interval")]
    pub confirmation_poll_interval: u64,
    /// Milliseconds after which a broadcast transaction is given up on.
    #[serde(default = "defaults::confirmation_timeout")]
    pub confirmation_timeout: u64,
    /// Milliseconds to wait before cancelling a failed outbound.
    #[serde(default = "defaults::cancel_settle_delay")]
    pub cancel_settle_delay: u64,
    /// Minimal gas budget of a cancellation transaction.
    #[serde(default = "defaults::min_cancel_gas_budget")]
    pub min_cancel_gas_budget: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            polling_interval: defaults::outbound_polling_interval(),
            schedule_lookahead: defaults::schedule_lookahead(),
            confirmation_poll_interval: defaults::confirmation_poll_interval(),
            confirmation_timeout: defaults::confirmation_timeout(),
            cancel_settle_delay: defaults::cancel_settle_delay(),
            min_cancel_gas_budget: defaults::min_cancel_gas_budget(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[tss]
max-pending-signatures = 3

[central]
block-time = 1000

[compliance]
restricted-addresses = ["0xBAD"]

[chains.sui]
name = "sui"
chain-id = 101
rpc-endpoint = "http://localhost:9000"
custody-address = "0xc0ffee"

[chains.sui.inbound]
polling-interval = 1500
scan-from = 5

[chains.old]
name = "old"
enabled = false
chain-id = 7
rpc-endpoint = "http://localhost:1"
"#;

    fn write_sample(dir: &std::path::Path) {
        std::fs::write(dir.join("main.toml"), SAMPLE).unwrap();
    }

    #[test]
    fn loads_and_post_processes_config() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let config = utils::load(dir.path()).unwrap();

        assert_eq!(config.tss.max_pending_signatures, 3);
        assert_eq!(config.central.block_time, 1000);
        assert_eq!(
            config.central.sync_chains_interval(),
            Duration::from_millis(2000)
        );
        assert_eq!(
            config.central.config_update_interval,
            defaults::config_update_interval()
        );
        assert_eq!(config.compliance.restricted_addresses, vec!["0xbad"]);

        // disabled chains are dropped and the rest are keyed by chain id.
        assert_eq!(config.chains.len(), 1);
        let sui = config.chain(ChainId(101)).expect("sui is enabled");
        assert_eq!(sui.name, "sui");
        assert_eq!(sui.custody_address.as_deref(), Some("0xc0ffee"));
        assert_eq!(sui.inbound.polling_interval, 1500);
        assert_eq!(sui.inbound.scan_from, Some(5));
        assert_eq!(sui.inbound.max_items_per_scan, 50);
        assert_eq!(sui.inbound.max_trackers_per_scan, 10);
        assert_eq!(sui.outbound.schedule_lookahead, 30);
        assert_eq!(sui.outbound.min_cancel_gas_budget, 2_000_000);
        assert_eq!(sui.capability_ttl, 300_000);
        assert_eq!(sui.outbound_cache_capacity, 1000);
        assert!(!sui.dry_mode);
        assert!(config.chain(ChainId(7)).is_none());
        assert_eq!(
            config.enabled_chain_ids(),
            HashSet::from_iter([ChainId(101)])
        );
    }

    #[test]
    fn duplicate_chain_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dup = r#"
[chains.a]
name = "a"
chain-id = 1
rpc-endpoint = "http://localhost:1"

[chains.b]
name = "b"
chain-id = 1
rpc-endpoint = "http://localhost:2"
"#;
        std::fs::write(dir.path().join("dup.toml"), dup).unwrap();
        assert!(utils::load(dir.path()).is_err());
    }

    #[test]
    fn missing_required_field_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let broken = r#"
[chains.a]
name = "a"
rpc-endpoint = "http://localhost:1"
"#;
        std::fs::write(dir.path().join("broken.toml"), broken).unwrap();
        let err = utils::load(dir.path()).unwrap_err();
        assert!(
            matches!(err, xrelay_utils::Error::ParseConfig(_)),
            "unexpected error: {err}"
        );
    }
}
