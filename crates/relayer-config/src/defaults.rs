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


//! Default values used when a field is missing from the configuration files.

/// Chains and their sub-systems are enabled unless stated otherwise.
pub const fn enabled() -> bool {
    true
}
/// At most `100` outbounds may wait on the TSS at once.
pub const fn max_pending_signatures() -> u32 {
    100
}
/// The central chain produces a block roughly every `6_000` milliseconds.
pub const fn central_block_time() -> u64 {
    6_000
}
/// The enabled-chain set is refreshed every `60_000` milliseconds.
pub const fn config_update_interval() -> u64 {
    60_000
}
/// Capability handles are refetched after `300_000` milliseconds.
pub const fn capability_ttl() -> u64 {
    300_000
}
/// The outbound correlation cache keeps `1_000` nonces.
pub const fn outbound_cache_capacity() -> usize {
    1_000
}
/// Inbound events are polled every `3_000` milliseconds.
pub const fn inbound_polling_interval() -> u64 {
    3_000
}
/// At most `50` raw events are fetched per inbound scan.
pub const fn max_items_per_scan() -> u64 {
    50
}
/// At most `10` inbound trackers are handled per scan.
pub const fn max_trackers_per_scan() -> usize {
    10
}
/// A failed vote is retried after `1_000` milliseconds.
pub const fn vote_retry_interval() -> u64 {
    1_000
}
/// A failed vote is retried `3` times.
pub const fn vote_max_retries() -> usize {
    3
}
/// Outbound trackers are polled every `6_000` milliseconds.
pub const fn outbound_polling_interval() -> u64 {
    6_000
}
/// At most `30` pending outbounds are scheduled per central block.
pub const fn schedule_lookahead() -> u64 {
    30
}
/// A broadcast transaction is polled every `2_000` milliseconds.
pub const fn confirmation_poll_interval() -> u64 {
    2_000
}
/// A broadcast transaction is abandoned after `120_000` milliseconds.
pub const fn confirmation_timeout() -> u64 {
    120_000
}
/// Wait `2_000` milliseconds before cancelling a failed outbound.
pub const fn cancel_settle_delay() -> u64 {
    2_000
}
/// Cancellation transactions pay at least `2_000_000` gas units.
pub const fn min_cancel_gas_budget() -> u64 {
    2_000_000
}
