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


use std::fmt::Debug;

use xrelay_types::{CanonicalInbound, ChainId, Cursor, TxHandle, TxStatus};
use xrelay_utils::Result;

/// Where the source transaction of an inbound stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    /// Final at `height`; the inbound may be voted on.
    Finalized {
        /// Height (checkpoint) the transaction was finalized at.
        height: u64,
    },
    /// Known to the node but not final yet.
    NotFinalized,
    /// Not indexed yet.
    NotFound,
}

/// Reads a connected chain.
///
/// Implementations hide the chain's wire format: they hand back raw
/// [`Item`](ChainObserver::Item)s and know how to turn one into a
/// [`CanonicalInbound`].
#[async_trait::async_trait]
pub trait ChainObserver: Send + Sync {
    /// A raw inbound event, as returned by the chain's RPC.
    type Item: Debug + Send + Sync;

    /// The chain this observer reads.
    fn chain_id(&self) -> ChainId;

    /// Where scanning starts when nothing was ever processed, usually the
    /// gateway deployment.
    async fn earliest_cursor(&self) -> Result<Cursor>;

    /// At most `limit` items strictly after `after`, oldest first.
    async fn fetch_inbound(
        &self,
        after: &Cursor,
        limit: u64,
    ) -> Result<Vec<Self::Item>>;

    /// The cursor pointing at `item`.
    fn cursor_of(&self, item: &Self::Item) -> Cursor;

    /// Decodes `item`, failing with [`Parse`](xrelay_utils::Error::Parse)
    /// on anything that is not a well-formed inbound.
    fn parse(&self, item: &Self::Item) -> Result<CanonicalInbound>;

    /// Looks up the source transaction of `inbound`.
    async fn locate(&self, inbound: &CanonicalInbound) -> Result<Located>;

    /// Every inbound event emitted by the transaction `tx_hash`.
    async fn transaction_events(&self, tx_hash: &str) -> Result<Vec<Self::Item>>;

    /// The execution status of an outbound transaction.
    async fn transaction_status(&self, tx: &TxHandle) -> Result<TxStatus>;

    /// The latest position of the chain, used to report the sync progress.
    async fn latest_position(&self) -> Result<u64>;
}
