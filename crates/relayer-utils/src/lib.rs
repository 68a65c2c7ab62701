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
//! # Relayer Utils 🕸️
//!
//! Shared building blocks for every crate of the relay client: the error type,
//! the injectable clock, metrics, probes and retry policies.

/// Injectable time source for polling loops and caches.
pub mod clock;
/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of the
/// relay client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Metrics registry error.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// The TSS rate limiter has no free permits.
    #[error("Signing throttled (chain: {chain_id}, nonce: {nonce})")]
    Throttled {
        /// The chain the signature was requested for.
        chain_id: i64,
        /// The outbound nonce.
        nonce: u64,
    },
    /// Another invocation is already processing this outbound.
    #[error("Outbound {chain_id}-{nonce} is already being processed")]
    OutboundActive {
        /// The destination chain.
        chain_id: i64,
        /// The outbound nonce.
        nonce: u64,
    },
    /// A raw chain item could not be decoded into a canonical event.
    #[error("Parse error: {}", _0)]
    Parse(String),
    /// A chain or central-chain RPC call failed.
    #[error("RPC error: {}", _0)]
    Rpc(String),
    /// The signing service returned an error.
    #[error("Signing error: {}", _0)]
    Signing(String),
    /// An intent that targets another chain reached this chain's signer.
    #[error("Chain id mismatch: want {expected}, got {got}")]
    ChainIdMismatch {
        /// The chain id of the signer.
        expected: i64,
        /// The chain id found in the intent.
        got: i64,
    },
    /// An outbound intent that can not be executed on its destination chain.
    #[error("Invalid outbound: {}", _0)]
    InvalidOutbound(String),
    /// A pending outbound nonce is too far ahead of the earliest one.
    #[error("Nonce {nonce} is too high, earliest nonce {earliest}")]
    NonceTooHigh {
        /// The offending nonce.
        nonce: u64,
        /// The earliest pending nonce.
        earliest: u64,
    },
    /// An attempt to move a persisted cursor backwards.
    #[error("Cursor regression for {key}: {current} -> {attempted}")]
    CursorRegression {
        /// The cursor key.
        key: String,
        /// The persisted position.
        current: u64,
        /// The rejected position.
        attempted: u64,
    },
    /// The task was cancelled while waiting.
    #[error("Task cancelled")]
    Cancelled,
}

/// A type alias for the result for the relay client, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error means "try again on a later tick" rather than a real failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Throttled { .. }
                | Error::OutboundActive { .. }
                | Error::Rpc(_)
                | Error::Cancelled
        )
    }
}
