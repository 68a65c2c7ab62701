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


use core::fmt;
use std::fmt::Debug;
use std::path::Path;

use xrelay_types::Cursor;

use super::{CursorKey, CursorStore};

const CURSORS_TREE: &str = "inbound_cursors";
const TARGET_POSITIONS_TREE: &str = "target_positions";

/// SledStore is a store that stores the cursors in a [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }
    /// Creates a temporary SledStore, removed from disk once dropped.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?.into_path();
        let db = sled::Config::new()
            .path(dir)
            .temporary(true)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }
}

impl CursorStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn get_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<Cursor>> {
        let tree = self.db.open_tree(CURSORS_TREE)?;
        let key: CursorKey = key.into();
        match tree.get(key.to_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn set_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        cursor: &Cursor,
    ) -> crate::Result<Option<Cursor>> {
        let tree = self.db.open_tree(CURSORS_TREE)?;
        let key: CursorKey = key.into();
        let key_bytes = key.to_bytes();
        let new_value = serde_json::to_vec(cursor)?;
        // compare-and-swap so two writers can never interleave a regression.
        loop {
            let current = tree.get(&key_bytes)?;
            let old = match current.as_ref() {
                Some(v) => Some(serde_json::from_slice::<Cursor>(v)?),
                None => None,
            };
            if let Some(old) = old.as_ref() {
                if old.would_regress(cursor) {
                    return Err(crate::regression(key, old, cursor));
                }
            }
            let swapped = tree.compare_and_swap(
                &key_bytes,
                current,
                Some(new_value.clone()),
            )?;
            if swapped.is_ok() {
                tree.flush()?;
                return Ok(old);
            }
            tracing::trace!(%key, "cursor changed concurrently, retrying");
        }
    }

    #[tracing::instrument(skip(self))]
    fn delete_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<Cursor>> {
        let tree = self.db.open_tree(CURSORS_TREE)?;
        let key: CursorKey = key.into();
        let removed = tree.remove(key.to_bytes())?;
        tree.flush()?;
        match removed {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn set_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        position: u64,
    ) -> crate::Result<()> {
        let tree = self.db.open_tree(TARGET_POSITIONS_TREE)?;
        let key: CursorKey = key.into();
        tree.insert(key.to_bytes(), &position.to_be_bytes())?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn get_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<u64>> {
        let tree = self.db.open_tree(TARGET_POSITIONS_TREE)?;
        let key: CursorKey = key.into();
        let val = tree.get(key.to_bytes())?;
        Ok(val.map(|v| {
            let mut output = [0u8; 8];
            output.copy_from_slice(&v);
            u64::from_be_bytes(output)
        }))
    }
}

impl fmt::Display for SledStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SledStore({} bytes)", self.get_data_stored_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrelay_types::ChainId;

    #[test]
    fn set_and_get_cursor_should_work() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        let chain_id = ChainId(103);
        assert!(store.get_cursor(chain_id).unwrap().is_none());

        let cursor = Cursor::new(20, "0xdigest,0");
        let old = store.set_cursor(chain_id, &cursor).unwrap();
        assert!(old.is_none());
        assert_eq!(store.get_cursor(chain_id).unwrap(), Some(cursor));
    }

    #[test]
    fn cursor_regression_is_rejected() {
        let store = SledStore::temporary().unwrap();
        let chain_id = ChainId(103);
        store.set_cursor(chain_id, &Cursor::new(9, "b")).unwrap();
        let res = store.set_cursor(chain_id, &Cursor::new(8, "a"));
        assert!(res.is_err(), "moving the cursor back must fail");
        assert_eq!(store.get_cursor(chain_id).unwrap().unwrap().position, 9);
        // same position with a new tag is allowed (several events per checkpoint).
        store.set_cursor(chain_id, &Cursor::new(9, "c")).unwrap();
        assert_eq!(store.get_cursor(chain_id).unwrap().unwrap().tag, "c");
    }

    #[test]
    fn target_position_roundtrip() {
        let store = SledStore::temporary().unwrap();
        assert_eq!(store.get_target_position(7i64).unwrap(), None);
        store.set_target_position(7i64, 1_000).unwrap();
        assert_eq!(store.get_target_position(7i64).unwrap(), Some(1_000));
    }
}
