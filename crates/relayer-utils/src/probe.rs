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

//! Probes are structured `tracing` events emitted under a dedicated target,
//! so operators (and integration tests) can follow what the relay client is
//! doing without parsing free-form log lines.

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "xrelay_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Inbound cursor sync state on a specific chain.
    #[display(fmt = "sync")]
    Sync,
    /// An inbound item was voted, skipped or halted on.
    #[display(fmt = "inbound")]
    Inbound,
    /// An outbound moved to a new state.
    #[display(fmt = "outbound")]
    Outbound,
    /// TSS signing requests and throttling.
    #[display(fmt = "signing")]
    Signing,
    /// Scheduler task lifecycle (registered, skipped, stopped).
    #[display(fmt = "scheduler")]
    Scheduler,
    /// An item was dropped because of a compliance restriction.
    #[display(fmt = "compliance")]
    Compliance,
    /// Tracker posted to the central chain.
    #[display(fmt = "tracker")]
    Tracker,
    /// When the relayer will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
