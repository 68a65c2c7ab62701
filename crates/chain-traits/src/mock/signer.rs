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


use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use xrelay_types::{
    CapabilityHandle, ChainId, CoinType, Digest, FailureKind, OutboundIntent,
    Signature, TxHandle, TxStatus,
};
use xrelay_utils::{Error, Result};

use crate::ChainSigner;

/// The only protocol version the mocked gateway accepts.
pub const MOCK_PROTOCOL_VERSION: u32 = 2;

/// An unsigned transaction of the mocked chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTx {
    /// Outbound nonce consumed by the transaction.
    pub nonce: u64,
    /// Paid address, `None` for a cancellation.
    pub receiver: Option<String>,
    /// Transferred amount.
    pub amount: u128,
    /// Gas budget.
    pub gas_budget: u64,
    /// Capability handle used to build the transaction.
    pub capability: Option<String>,
}

impl MockTx {
    /// Whether this only consumes the nonce.
    pub fn is_cancel(&self) -> bool {
        self.receiver.is_none()
    }

    /// The handle `broadcast` returns for this transaction.
    pub fn handle(&self) -> TxHandle {
        if self.is_cancel() {
            TxHandle(format!("0xcancel-{}", self.nonce))
        } else {
            TxHandle(format!("0xwithdraw-{}", self.nonce))
        }
    }
}

/// A chain that accepts every transaction and answers scripted statuses.
///
/// Execution errors containing `retryable` are classified as
/// [`FailureKind::Retryable`].
#[derive(Debug)]
pub struct MockChainSigner {
    chain_id: ChainId,
    invalid_recipients: Mutex<HashSet<String>>,
    requires_capability: AtomicBool,
    capability_fetches: AtomicUsize,
    broadcasts: Mutex<Vec<(MockTx, Signature)>>,
    broadcast_delay: Mutex<Option<Duration>>,
    statuses: Mutex<HashMap<TxHandle, VecDeque<TxStatus>>>,
    status_queries: AtomicUsize,
    next_nonce: AtomicU64,
}

impl MockChainSigner {
    /// A signer for `chain_id`.
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            invalid_recipients: Default::default(),
            requires_capability: AtomicBool::new(false),
            capability_fetches: Default::default(),
            broadcasts: Default::default(),
            broadcast_delay: Default::default(),
            statuses: Default::default(),
            status_queries: Default::default(),
            next_nonce: Default::default(),
        }
    }

    /// Marks `address` as an invalid recipient.
    pub fn reject_recipient(&self, address: &str) {
        self.invalid_recipients.lock().insert(address.to_owned());
    }

    /// Makes withdrawals need a capability handle.
    pub fn require_capability(&self, required: bool) {
        self.requires_capability.store(required, Ordering::SeqCst);
    }

    /// How many capability handles were fetched.
    pub fn capability_fetches(&self) -> usize {
        self.capability_fetches.load(Ordering::SeqCst)
    }

    /// Makes every broadcast take `delay`.
    pub fn set_broadcast_delay(&self, delay: Duration) {
        *self.broadcast_delay.lock() = Some(delay);
    }

    /// Scripts the statuses returned for `tx`, one per query; the last one
    /// repeats. Transactions without a script succeed right away.
    pub fn script_status(
        &self,
        tx: impl Into<TxHandle>,
        statuses: impl IntoIterator<Item = TxStatus>,
    ) {
        self.statuses
            .lock()
            .insert(tx.into(), statuses.into_iter().collect());
    }

    /// Every broadcast transaction, with its signature.
    pub fn broadcasts(&self) -> Vec<(MockTx, Signature)> {
        self.broadcasts.lock().clone()
    }

    /// How many transaction statuses were queried.
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    /// Sets the next nonce the chain expects.
    pub fn set_next_nonce(&self, nonce: u64) {
        self.next_nonce.store(nonce, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ChainSigner for MockChainSigner {
    type Tx = MockTx;

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn validate(&self, intent: &OutboundIntent) -> Result<()> {
        if intent.receiver_chain_id != self.chain_id {
            return Err(Error::ChainIdMismatch {
                expected: self.chain_id.get(),
                got: intent.receiver_chain_id.get(),
            });
        }
        if intent.protocol_version != MOCK_PROTOCOL_VERSION {
            return Err(Error::InvalidOutbound(format!(
                "invalid protocol version {}",
                intent.protocol_version
            )));
        }
        if intent.coin_type == CoinType::NoAssetCall {
            return Err(Error::InvalidOutbound(String::from(
                "unsupported coin type",
            )));
        }
        Ok(())
    }

    fn is_valid_recipient(&self, address: &str) -> bool {
        !address.is_empty() && !self.invalid_recipients.lock().contains(address)
    }

    fn requires_capability(&self, _intent: &OutboundIntent) -> bool {
        self.requires_capability.load(Ordering::SeqCst)
    }

    async fn fetch_capability(&self) -> Result<String> {
        let n = self.capability_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xcap{n}"))
    }

    async fn build_withdrawal(
        &self,
        intent: &OutboundIntent,
        receiver: &str,
        capability: Option<&CapabilityHandle>,
    ) -> Result<Self::Tx> {
        Ok(MockTx {
            nonce: intent.nonce,
            receiver: Some(receiver.to_owned()),
            amount: intent.amount,
            gas_budget: intent.gas_budget,
            capability: capability.map(|c| c.handle_id.clone()),
        })
    }

    async fn build_cancel(
        &self,
        intent: &OutboundIntent,
        capability: Option<&CapabilityHandle>,
        gas_budget: u64,
    ) -> Result<Self::Tx> {
        Ok(MockTx {
            nonce: intent.nonce,
            receiver: None,
            amount: 0,
            gas_budget,
            capability: capability.map(|c| c.handle_id.clone()),
        })
    }

    fn signing_digest(&self, tx: &Self::Tx) -> Result<Digest> {
        Ok(Digest::sha256d(b"mock", format!("{tx:?}").as_bytes()))
    }

    async fn broadcast(
        &self,
        tx: &Self::Tx,
        signature: &Signature,
    ) -> Result<TxHandle> {
        let delay = *self.broadcast_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.broadcasts.lock().push((tx.clone(), *signature));
        Ok(tx.handle())
    }

    async fn transaction_status(&self, tx: &TxHandle) -> Result<TxStatus> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock();
        let status = match statuses.get_mut(tx) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        Ok(status.unwrap_or(TxStatus::Success))
    }

    fn classify_failure(&self, error: &str) -> FailureKind {
        if error.to_lowercase().contains("retryable") {
            FailureKind::Retryable
        } else {
            FailureKind::NonRetryable
        }
    }

    async fn next_nonce(&self) -> Result<u64> {
        Ok(self.next_nonce.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_statuses_repeat_the_last_one() {
        let signer = MockChainSigner::new(ChainId(1));
        signer.script_status(
            "0xwithdraw-1",
            [TxStatus::Pending, TxStatus::Failed("boom".into())],
        );
        let tx = TxHandle::from("0xwithdraw-1");
        assert_eq!(signer.transaction_status(&tx).await.unwrap(), TxStatus::Pending);
        for _ in 0..2 {
            assert_eq!(
                signer.transaction_status(&tx).await.unwrap(),
                TxStatus::Failed("boom".into())
            );
        }
        assert_eq!(
            signer
                .transaction_status(&TxHandle::from("0xother"))
                .await
                .unwrap(),
            TxStatus::Success
        );
        assert_eq!(signer.status_queries(), 4);
    }
}
