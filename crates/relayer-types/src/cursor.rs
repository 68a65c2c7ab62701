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


use std::fmt;

use serde::{Deserialize, Serialize};

/// The last inbound item fully processed for one chain.
///
/// `position` follows the chain's native ordering (a checkpoint, a logical
/// time, a sequence number); `tag` is opaque to everything but the chain
/// client and usually identifies the exact event (a tx digest plus an event
/// sequence, for example).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    /// Chain-native ordering position.
    pub position: u64,
    /// Opaque chain-defined key.
    pub tag: String,
}

impl Cursor {
    /// Creates a new cursor.
    pub fn new(position: u64, tag: impl Into<String>) -> Self {
        Self {
            position,
            tag: tag.into(),
        }
    }

    /// `true` if moving from `self` to `next` would go backwards.
    pub fn would_regress(&self, next: &Cursor) -> bool {
        next.position < self.position
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "#{}", self.position)
        } else {
            write!(f, "#{} ({})", self.position, self.tag)
        }
    }
}
