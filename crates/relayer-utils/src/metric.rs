// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{
    register_counter_with_registry, register_gauge_with_registry, Encoder,
    Registry, TextEncoder,
};

/// A struct definition for collecting metrics in the relayer.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Inbound votes posted to the central chain.
    pub inbound_votes_posted: GenericCounter<AtomicF64>,
    /// Inbound votes that failed to post after all retries.
    pub inbound_vote_failures: GenericCounter<AtomicF64>,
    /// Inbound items dropped because they could not be parsed.
    pub inbound_items_unparseable: GenericCounter<AtomicF64>,
    /// Inbound scans halted on an item that is not located yet.
    pub inbound_scan_halts: GenericCounter<AtomicF64>,
    /// Inbound items dropped because of a compliance restriction.
    pub compliance_skips: GenericCounter<AtomicF64>,
    /// Outbounds that reached a terminal state.
    pub outbounds_processed: GenericCounter<AtomicF64>,
    /// Outbound trackers posted to the central chain.
    pub outbound_trackers_posted: GenericCounter<AtomicF64>,
    /// Outbound votes posted to the central chain.
    pub outbound_votes_posted: GenericCounter<AtomicF64>,
    /// Cancellation transactions broadcast.
    pub outbound_cancellations: GenericCounter<AtomicF64>,
    /// Signatures requested from the TSS.
    pub signatures_requested: GenericCounter<AtomicF64>,
    /// Signing requests rejected by the rate limiter.
    pub signing_throttled: GenericCounter<AtomicF64>,
    /// Scheduler task invocations that returned an error.
    pub scheduler_task_failures: GenericCounter<AtomicF64>,
    /// Signatures currently in flight.
    pub pending_signatures: GenericGauge<AtomicF64>,
    registry: Registry,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("xrelay".into()), None)?;

        let inbound_votes_posted = register_counter_with_registry!(
            "inbound_votes_posted",
            "The total number of inbound votes posted",
            registry
        )?;

        let inbound_vote_failures = register_counter_with_registry!(
            "inbound_vote_failures",
            "The total number of inbound votes that failed to post",
            registry
        )?;

        let inbound_items_unparseable = register_counter_with_registry!(
            "inbound_items_unparseable",
            "Inbound items skipped because they could not be parsed",
            registry
        )?;

        let inbound_scan_halts = register_counter_with_registry!(
            "inbound_scan_halts",
            "How many times an inbound scan halted on a not yet located item",
            registry
        )?;

        let compliance_skips = register_counter_with_registry!(
            "compliance_skips",
            "Inbound items skipped because of a restricted address",
            registry
        )?;

        let outbounds_processed = register_counter_with_registry!(
            "outbounds_processed",
            "Total number of outbounds that reached a terminal state",
            registry
        )?;

        let outbound_trackers_posted = register_counter_with_registry!(
            "outbound_trackers_posted",
            "Total number of outbound trackers posted",
            registry
        )?;

        let outbound_votes_posted = register_counter_with_registry!(
            "outbound_votes_posted",
            "Total number of outbound votes posted",
            registry
        )?;

        let outbound_cancellations = register_counter_with_registry!(
            "outbound_cancellations",
            "Total number of cancellation transactions broadcast",
            registry
        )?;

        let signatures_requested = register_counter_with_registry!(
            "signatures_requested",
            "The total number of signatures requested from the TSS",
            registry
        )?;

        let signing_throttled = register_counter_with_registry!(
            "signing_throttled",
            "How many times the TSS rate limiter throttled a request",
            registry
        )?;

        let scheduler_task_failures = register_counter_with_registry!(
            "scheduler_task_failures",
            "How many scheduled task invocations returned an error",
            registry
        )?;

        let pending_signatures = register_gauge_with_registry!(
            "pending_signatures",
            "Signatures currently in flight",
            registry
        )?;

        Ok(Self {
            inbound_votes_posted,
            inbound_vote_failures,
            inbound_items_unparseable,
            inbound_scan_halts,
            compliance_skips,
            outbounds_processed,
            outbound_trackers_posted,
            outbound_votes_posted,
            outbound_cancellations,
            signatures_requested,
            signing_throttled,
            scheduler_task_failures,
            pending_signatures,
            registry,
        })
    }

    /// Gathers the whole relayer metrics
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        // Gather the metrics.
        let metric_families = self.registry.gather();
        // Encode them to send.
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

/// Error type for gathering metrics.
#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    /// Error while gathering metrics.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Error while converting metrics to string.
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
