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


use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use xrelay_types::ChainId;
use xrelay_utils::{Error, Result};

/// Marks a nonce as being processed until dropped.
#[derive(Debug)]
pub(crate) struct InFlight {
    nonces: Arc<Mutex<HashSet<u64>>>,
    nonce: u64,
}

impl InFlight {
    /// Fails with [`Error::OutboundActive`] if `nonce` is already taken.
    pub(crate) fn enter(
        nonces: Arc<Mutex<HashSet<u64>>>,
        chain_id: ChainId,
        nonce: u64,
    ) -> Result<Self> {
        if !nonces.lock().insert(nonce) {
            return Err(Error::OutboundActive {
                chain_id: chain_id.get(),
                nonce,
            });
        }
        Ok(Self { nonces, nonce })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.nonces.lock().remove(&self.nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_released_on_drop() {
        let nonces = Arc::new(Mutex::new(HashSet::new()));
        let guard = InFlight::enter(nonces.clone(), ChainId(1), 7).unwrap();
        assert!(matches!(
            InFlight::enter(nonces.clone(), ChainId(1), 7),
            Err(Error::OutboundActive { nonce: 7, .. })
        ));
        assert!(InFlight::enter(nonces.clone(), ChainId(1), 8).is_ok());
        drop(guard);
        assert!(nonces.lock().is_empty());
    }
}
