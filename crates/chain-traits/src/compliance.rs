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

/// Screens addresses before anything is relayed for them.
pub trait ComplianceChecker: Send + Sync {
    /// `true` if nothing may be relayed to or from `address`.
    fn is_restricted(&self, address: &str) -> bool;
}

impl<T> ComplianceChecker for Arc<T>
where
    T: ComplianceChecker + ?Sized,
{
    fn is_restricted(&self, address: &str) -> bool {
        T::is_restricted(self, address)
    }
}

/// A fixed list of restricted addresses, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct RestrictedAddressList {
    addresses: HashSet<String>,
}

impl RestrictedAddressList {
    /// Builds the list from the configured addresses.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .map(|a| normalize(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        Self { addresses }
    }

    /// Number of restricted addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// `true` when nothing is restricted.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl ComplianceChecker for RestrictedAddressList {
    fn is_restricted(&self, address: &str) -> bool {
        !self.addresses.is_empty()
            && self.addresses.contains(&normalize(address))
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ignores_case_and_whitespace() {
        let list = RestrictedAddressList::new(["0xBAD", " 0xEvil ", ""]);
        assert_eq!(list.len(), 2);
        assert!(list.is_restricted("0xbad"));
        assert!(list.is_restricted("0XBAD"));
        assert!(list.is_restricted("0xevil"));
        assert!(!list.is_restricted("0xgood"));
        assert!(!list.is_restricted(""));
    }
}
