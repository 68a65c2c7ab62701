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


use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use xrelay_types::Cursor;

use super::{CursorKey, CursorStore};

/// InMemoryStore is a store that keeps the cursors in memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    cursors: Arc<RwLock<HashMap<CursorKey, Cursor>>>,
    target_positions: Arc<RwLock<HashMap<CursorKey, u64>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl CursorStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn get_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<Cursor>> {
        let guard = self.cursors.read();
        Ok(guard.get(&key.into()).cloned())
    }

    #[tracing::instrument(skip(self))]
    fn set_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        cursor: &Cursor,
    ) -> crate::Result<Option<Cursor>> {
        let key = key.into();
        let mut guard = self.cursors.write();
        if let Some(current) = guard.get(&key) {
            if current.would_regress(cursor) {
                return Err(crate::regression(key, current, cursor));
            }
        }
        Ok(guard.insert(key, cursor.clone()))
    }

    #[tracing::instrument(skip(self))]
    fn delete_cursor<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<Cursor>> {
        Ok(self.cursors.write().remove(&key.into()))
    }

    #[tracing::instrument(skip(self))]
    fn set_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
        position: u64,
    ) -> crate::Result<()> {
        self.target_positions.write().insert(key.into(), position);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn get_target_position<K: Into<CursorKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<u64>> {
        Ok(self.target_positions.read().get(&key.into()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrelay_types::ChainId;

    #[test]
    fn missing_cursor_is_none() {
        let store = InMemoryStore::default();
        assert_eq!(store.get_cursor(ChainId(1)).unwrap(), None);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let store = InMemoryStore::default();
        let chain = ChainId(101);
        store.set_cursor(chain, &Cursor::new(5, "e5")).unwrap();
        let old = store.set_cursor(chain, &Cursor::new(7, "e7")).unwrap();
        assert_eq!(old, Some(Cursor::new(5, "e5")));

        let err = store.set_cursor(chain, &Cursor::new(6, "e6")).unwrap_err();
        assert!(
            matches!(err, xrelay_utils::Error::CursorRegression { current: 7, attempted: 6, .. }),
            "unexpected error: {err:?}"
        );
        assert_eq!(
            store.get_cursor(chain).unwrap(),
            Some(Cursor::new(7, "e7")),
            "a rejected write must not change the cursor"
        );
    }

    #[test]
    fn cursors_are_isolated_per_chain() {
        let store = Arc::new(InMemoryStore::default());
        store.set_cursor(1i64, &Cursor::new(10, "")).unwrap();
        store.set_cursor(2i64, &Cursor::new(3, "")).unwrap();
        assert_eq!(store.get_cursor(1i64).unwrap().map(|c| c.position), Some(10));
        assert_eq!(store.get_cursor(2i64).unwrap().map(|c| c.position), Some(3));
        store.set_target_position(1i64, 42).unwrap();
        assert_eq!(store.get_target_position(1i64).unwrap(), Some(42));
        assert_eq!(store.get_target_position(2i64).unwrap(), None);
    }

    #[test]
    fn deleted_cursor_can_start_over() {
        let store = InMemoryStore::default();
        store.set_cursor(5i64, &Cursor::new(50, "")).unwrap();
        let removed = store.delete_cursor(5i64).unwrap();
        assert_eq!(removed.map(|c| c.position), Some(50));
        assert!(store.get_cursor(5i64).unwrap().is_none());
        store.set_cursor(5i64, &Cursor::new(1, "")).unwrap();
    }
}
