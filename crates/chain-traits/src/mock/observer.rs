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


use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use xrelay_types::{CanonicalInbound, ChainId, Cursor, TxHandle, TxStatus};
use xrelay_utils::{Error, Result};

use crate::{ChainObserver, Located};

/// A raw inbound of the mocked chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockItem {
    /// Position of the item.
    pub cursor: Cursor,
    /// Source transaction.
    pub tx_hash: String,
    /// `None` for an item that does not parse.
    pub inbound: Option<CanonicalInbound>,
}

impl MockItem {
    /// A gas deposit of `amount` from `sender` to `receiver`.
    pub fn deposit(
        position: u64,
        tx_hash: &str,
        sender: &str,
        receiver: &str,
        amount: u128,
    ) -> Self {
        Self {
            cursor: Cursor::new(position, format!("{tx_hash},0")),
            tx_hash: tx_hash.to_owned(),
            inbound: Some(CanonicalInbound {
                source_tx_hash: tx_hash.to_owned(),
                event_index: 0,
                sender: sender.to_owned(),
                receiver: receiver.to_owned(),
                amount,
                asset: String::new(),
                payload: None,
                is_cross_chain_call: false,
            }),
        }
    }

    /// An event that is not an inbound.
    pub fn garbage(position: u64, tx_hash: &str) -> Self {
        Self {
            cursor: Cursor::new(position, format!("{tx_hash},0")),
            tx_hash: tx_hash.to_owned(),
            inbound: None,
        }
    }
}

/// A chain whose events and transactions are scripted by the test.
#[derive(Debug)]
pub struct MockChainObserver {
    chain_id: ChainId,
    earliest: Mutex<Cursor>,
    items: Mutex<Vec<MockItem>>,
    locations: Mutex<HashMap<String, Located>>,
    locate_failures: Mutex<HashSet<String>>,
    tx_events: Mutex<HashMap<String, Vec<MockItem>>>,
    statuses: Mutex<HashMap<TxHandle, TxStatus>>,
    status_queries: AtomicUsize,
    fetches: Mutex<Vec<Cursor>>,
    latest: AtomicU64,
}

impl MockChainObserver {
    /// A chain with no event, whose history starts at position `0`.
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            earliest: Mutex::new(Cursor::new(0, "")),
            items: Default::default(),
            locations: Default::default(),
            locate_failures: Default::default(),
            tx_events: Default::default(),
            statuses: Default::default(),
            status_queries: Default::default(),
            fetches: Default::default(),
            latest: Default::default(),
        }
    }

    /// Sets the earliest cursor.
    pub fn set_earliest(&self, cursor: Cursor) {
        *self.earliest.lock() = cursor;
    }

    /// Adds an inbound event.
    pub fn push_item(&self, item: MockItem) {
        let mut items = self.items.lock();
        items.push(item);
        items.sort_by_key(|i| i.cursor.position);
        let latest = items.last().map(|i| i.cursor.position).unwrap_or(0);
        self.latest.fetch_max(latest, Ordering::SeqCst);
    }

    /// Sets what `locate` answers for `tx_hash`; `Finalized { height: 100 }`
    /// by default.
    pub fn set_location(&self, tx_hash: &str, location: Located) {
        self.locations.lock().insert(tx_hash.to_owned(), location);
    }

    /// Makes `locate` fail for `tx_hash`.
    pub fn fail_locate(&self, tx_hash: &str) {
        self.locate_failures.lock().insert(tx_hash.to_owned());
    }

    /// Sets the events emitted by `tx_hash`.
    pub fn set_tx_events(&self, tx_hash: &str, items: Vec<MockItem>) {
        self.tx_events.lock().insert(tx_hash.to_owned(), items);
    }

    /// Sets the status of an outbound transaction.
    pub fn set_status(&self, tx: impl Into<TxHandle>, status: TxStatus) {
        self.statuses.lock().insert(tx.into(), status);
    }

    /// How many transaction statuses were queried.
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    /// The cursors `fetch_inbound` was called with.
    pub fn fetches(&self) -> Vec<Cursor> {
        self.fetches.lock().clone()
    }
}

#[async_trait::async_trait]
impl ChainObserver for MockChainObserver {
    type Item = MockItem;

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn earliest_cursor(&self) -> Result<Cursor> {
        Ok(self.earliest.lock().clone())
    }

    async fn fetch_inbound(
        &self,
        after: &Cursor,
        limit: u64,
    ) -> Result<Vec<Self::Item>> {
        self.fetches.lock().push(after.clone());
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|i| i.cursor.position > after.position)
            .take(limit)
            .cloned()
            .collect())
    }

    fn cursor_of(&self, item: &Self::Item) -> Cursor {
        item.cursor.clone()
    }

    fn parse(&self, item: &Self::Item) -> Result<CanonicalInbound> {
        item.inbound.clone().ok_or_else(|| {
            Error::Parse(format!("{} is not an inbound event", item.tx_hash))
        })
    }

    async fn locate(&self, inbound: &CanonicalInbound) -> Result<Located> {
        if self.locate_failures.lock().contains(&inbound.source_tx_hash) {
            return Err(Error::Rpc(format!(
                "unable to query {}",
                inbound.source_tx_hash
            )));
        }
        Ok(self
            .locations
            .lock()
            .get(&inbound.source_tx_hash)
            .copied()
            .unwrap_or(Located::Finalized { height: 100 }))
    }

    async fn transaction_events(
        &self,
        tx_hash: &str,
    ) -> Result<Vec<Self::Item>> {
        Ok(self.tx_events.lock().get(tx_hash).cloned().unwrap_or_default())
    }

    async fn transaction_status(&self, tx: &TxHandle) -> Result<TxStatus> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .get(tx)
            .cloned()
            .unwrap_or(TxStatus::NotFound))
    }

    async fn latest_position(&self) -> Result<u64> {
        Ok(self.latest.load(Ordering::SeqCst))
    }
}
