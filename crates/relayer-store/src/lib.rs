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
//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store persists the inbound cursor of every observed chain, so
//! a restarted process resumes scanning exactly where it stopped. Cursors are
//! written after every processed item and never move backwards.
//!
use std::fmt::{Debug, Display};
use std::sync::Arc;

use xrelay_types::{ChainId, Cursor};
use xrelay_utils::Result;
/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// CursorKey identifies one persisted cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CursorKey {
    /// The inbound scanning cursor of a chain.
    Inbound {
        /// The observed chain.
        chain_id: ChainId,
    },
}

impl CursorKey {
    /// Returns the chain id of the chain this key is for.
    pub fn chain_id(&self) -> ChainId {
        match self {
            CursorKey::Inbound { chain_id } => *chain_id,
        }
    }

    /// Returns the bytes of the key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut vec = vec![];
        match self {
            Self::Inbound { chain_id } => {
                vec.push(0u8);
                vec.extend_from_slice(&chain_id.get().to_be_bytes());
            }
        }
        vec
    }
}

impl Display for CursorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound { chain_id } => {
                write!(f, "Inbound(ChainId {chain_id})")
            }
        }
    }
}

impl From<ChainId> for CursorKey {
    fn from(chain_id: ChainId) -> Self {
        Self::Inbound { chain_id }
    }
}

impl From<i64> for CursorKey {
    fn from(chain_id: i64) -> Self {
        Self::Inbound {
            chain_id: ChainId(chain_id),
        }
    }
}

/// CursorStore is a simple trait for storing and retrieving the scanning
/// position of each chain.
pub trait CursorStore: Clone + Send + Sync {
    /// Get the persisted cursor, if any.
    fn get_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<Cursor>>;

    /// Persists `cursor` and returns the previous one.
    ///
    /// Fails with [`xrelay_utils::Error::CursorRegression`] if `cursor` is
    /// behind the persisted one; the stored value is left untouched.
    fn set_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        cursor: &Cursor,
    ) -> Result<Option<Cursor>>;

    /// Removes the cursor, so the next scan bootstraps it again.
    ///
    /// Returns the removed cursor, if any.
    fn delete_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<Cursor>>;

    /// Sets the Target position (usually the latest position of the chain).
    /// This is used to report how far behind the cursor is.
    fn set_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        position: u64,
    ) -> Result<()>;

    /// Get the target position, `None` if it was never recorded.
    fn get_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<u64>>;
}

impl<S> CursorStore for Arc<S>
where
    S: CursorStore,
{
    fn get_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<Cursor>> {
        S::get_cursor(self, key)
    }

    fn set_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        cursor: &Cursor,
    ) -> Result<Option<Cursor>> {
        S::set_cursor(self, key, cursor)
    }

    fn delete_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<Cursor>> {
        S::delete_cursor(self, key)
    }

    fn set_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        position: u64,
    ) -> Result<()> {
        S::set_target_position(self, key, position)
    }

    fn get_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<u64>> {
        S::get_target_position(self, key)
    }
}

/// Returns the error for an attempt to move `current` back to `next`.
pub(crate) fn regression(
    key: CursorKey,
    current: &Cursor,
    next: &Cursor,
) -> xrelay_utils::Error {
    xrelay_utils::Error::CursorRegression {
        key: key.to_string(),
        current: current.position,
        attempted: next.position,
    }
}
